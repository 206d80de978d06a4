//! Wire endpoints.
//!
//! Peers are addressed as an IPv6 address plus UDP port. IPv4 addresses are
//! always stored in v4-mapped form so a peer contacted over both stacks
//! occupies a single table entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::str::FromStr;

use crate::error::TypeError;

/// Serialized size on the wire: 16 address bytes + 2 port bytes.
pub const ENDPOINT_WIRE_SIZE: usize = 18;

/// An IPv6 address + UDP port. IPv4 is normalized to v4-mapped v6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    addr: Ipv6Addr,
    port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl Endpoint {
    /// The all-zero endpoint, used to pad keepalive slots.
    pub const UNSPECIFIED: Self = Self {
        addr: Ipv6Addr::UNSPECIFIED,
        port: 0,
    };

    pub fn new(addr: Ipv6Addr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_unspecified(&self) -> bool {
        self.addr.is_unspecified()
    }

    /// Convert from a socket address, mapping IPv4 into v6 space.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr.ip() {
            IpAddr::V4(v4) => Self::new(v4.to_ipv6_mapped(), addr.port()),
            IpAddr::V6(v6) => Self::new(v6, addr.port()),
        }
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::V6(SocketAddrV6::new(self.addr, self.port, 0, 0))
    }

    /// Serialize to the 18-byte wire layout (address octets, port LE).
    pub fn to_wire(&self) -> [u8; ENDPOINT_WIRE_SIZE] {
        let mut out = [0u8; ENDPOINT_WIRE_SIZE];
        out[..16].copy_from_slice(&self.addr.octets());
        out[16..].copy_from_slice(&self.port.to_le_bytes());
        out
    }

    pub fn from_wire(bytes: &[u8; ENDPOINT_WIRE_SIZE]) -> Self {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&bytes[..16]);
        let port = u16::from_le_bytes([bytes[16], bytes[17]]);
        Self::new(Ipv6Addr::from(octets), port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.addr, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both plain v4 "a.b.c.d:port" and bracketed v6 "[..]:port".
        let sock: SocketAddr = s
            .parse()
            .map_err(|_| TypeError::InvalidEndpoint(s.to_string()))?;
        Ok(Self::from_socket_addr(sock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn v4_is_mapped() {
        let ep = Endpoint::from_socket_addr(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            7075,
        ));
        assert_eq!(ep.addr(), Ipv4Addr::new(192, 168, 1, 1).to_ipv6_mapped());
        assert_eq!(ep.port(), 7075);
    }

    #[test]
    fn same_peer_over_both_stacks_is_one_endpoint() {
        let v4: Endpoint = "10.0.0.1:7075".parse().unwrap();
        let v6: Endpoint = "[::ffff:10.0.0.1]:7075".parse().unwrap();
        assert_eq!(v4, v6);
    }

    #[test]
    fn wire_roundtrip() {
        let ep: Endpoint = "[2001:db8::1]:54000".parse().unwrap();
        assert_eq!(Endpoint::from_wire(&ep.to_wire()), ep);
    }

    #[test]
    fn unspecified_padding_slot() {
        assert!(Endpoint::UNSPECIFIED.is_unspecified());
        assert_eq!(Endpoint::from_wire(&[0u8; 18]), Endpoint::UNSPECIFIED);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not-an-endpoint".parse::<Endpoint>().is_err());
    }
}
