//! Consensus — conflict resolution by delegated representative voting.
//!
//! Each conflicting root gets one election. Representatives vote; the tally
//! weighs votes by delegated balance; the leader confirms once it exceeds
//! half the supply, or at the announcement cutoff. The state machines here
//! are pure: they return outcome values (blocks to broadcast, force items,
//! confirmations) and the node performs the side effects.
//!
//! ## Module overview
//!
//! - [`election`] — per-root tally with the one-shot confirmation latch.
//! - [`active`] — the election container and announcement-loop bookkeeping.
//! - [`gap_cache`] — blocks seen only in votes; the bootstrap trigger.
//! - [`rep_crawler`] — outstanding representative probes.
//! - [`block_arrival`] — the recently-arrived-over-UDP window.

pub mod active;
pub mod block_arrival;
pub mod election;
pub mod gap_cache;
pub mod rep_crawler;

pub use active::{ActiveTransactions, AnnounceOutcome, VoteOutcome};
pub use block_arrival::BlockArrival;
pub use election::{Confirmation, Election};
pub use gap_cache::GapCache;
pub use rep_crawler::RepCrawler;
