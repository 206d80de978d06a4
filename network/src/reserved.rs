//! Reserved sender filtering.
//!
//! Datagrams from non-routable, documentation, or multicast ranges are
//! dropped before parsing. Loopback is reserved too, except on the test
//! network where nodes deliberately run side by side on one host.

use raze_types::{Endpoint, NetworkId};
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

fn mapped(a: u8, b: u8, c: u8, d: u8) -> Ipv6Addr {
    Ipv4Addr::new(a, b, c, d).to_ipv6_mapped()
}

/// Whether `endpoint` falls in a range that must never appear as a peer.
pub fn reserved_address(endpoint: &Endpoint, network: NetworkId) -> bool {
    let addr = endpoint.addr();
    let ranges: [(Ipv6Addr, Ipv6Addr); 9] = [
        // RFC 1700 "this network"
        (mapped(0, 0, 0, 0), mapped(0, 255, 255, 255)),
        // RFC 5737 documentation ranges
        (mapped(192, 0, 2, 0), mapped(192, 0, 2, 255)),
        (mapped(198, 51, 100, 0), mapped(198, 51, 100, 255)),
        (mapped(203, 0, 113, 0), mapped(203, 0, 113, 255)),
        // IPv4 multicast
        (mapped(224, 0, 0, 0), mapped(239, 255, 255, 255)),
        // RFC 6890 future use
        (mapped(240, 0, 0, 0), mapped(255, 255, 255, 255)),
        // RFC 6666 discard prefix
        (
            Ipv6Addr::new(0x100, 0, 0, 0, 0, 0, 0, 0),
            Ipv6Addr::new(0x100, 0, 0, 0, 0xffff, 0xffff, 0xffff, 0xffff),
        ),
        // RFC 3849 documentation prefix
        (
            Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0),
            Ipv6Addr::new(0x2001, 0xdb8, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
        ),
        // IPv6 multicast
        (
            Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0),
            Ipv6Addr::new(0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
        ),
    ];
    for (low, high) in ranges {
        if addr >= low && addr <= high {
            return true;
        }
    }
    if !network.allow_local_peers() {
        if addr.is_loopback() {
            return true;
        }
        let v4_loopback_low = mapped(127, 0, 0, 0);
        let v4_loopback_high = mapped(127, 255, 255, 255);
        if addr >= v4_loopback_low && addr <= v4_loopback_high {
            return true;
        }
    }
    false
}
