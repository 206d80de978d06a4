//! Gossip networking for the raze protocol.
//!
//! A single UDP socket per node, a peer table with the orderings the
//! maintenance loops need (silence purge, rep crawl, bootstrap selection,
//! weight-ranked representatives), and the reserved-address filter applied
//! to every inbound sender.

pub mod peers;
pub mod reserved;
pub mod stats;
pub mod udp;

pub use peers::{PeerContainer, PeerInfo};
pub use reserved::reserved_address;
pub use stats::NetworkStats;
pub use udp::{InboundHandler, UdpChannel};
