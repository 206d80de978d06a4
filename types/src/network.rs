//! Network identifier.
//!
//! Each network pins its own wire magic, default peering port, proof-of-work
//! threshold, and genesis key material. Nodes on different networks discard
//! each other's datagrams at the parser.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::TypeError;

/// Identifies which raze network a node participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production network.
    Live,
    /// The public beta network.
    Beta,
    /// Local test network. Loopback peers are allowed and proof-of-work is cheap.
    Test,
}

impl NetworkId {
    /// The two magic bytes prefixed to every datagram on this network.
    pub fn magic(&self) -> [u8; 2] {
        match self {
            Self::Live => *b"RC",
            Self::Beta => *b"RB",
            Self::Test => *b"RA",
        }
    }

    /// Default UDP peering port.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Live => 7075,
            Self::Beta => 7074,
            Self::Test => 54000,
        }
    }

    /// Minimum proof-of-work value for a block to be relayed.
    pub fn work_threshold(&self) -> u64 {
        match self {
            Self::Live | Self::Beta => 0xffff_ffc0_0000_0000,
            Self::Test => 0xff00_0000_0000_0000,
        }
    }

    /// Whether loopback senders are acceptable (test network only).
    pub fn allow_local_peers(&self) -> bool {
        matches!(self, Self::Test)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Beta => "beta",
            Self::Test => "test",
        }
    }
}

impl FromStr for NetworkId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "beta" => Ok(Self::Beta),
            "test" => Ok(Self::Test),
            other => Err(TypeError::UnknownNetwork(other.to_string())),
        }
    }
}
