//! Fundamental types for the raze protocol.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: block hashes, accounts, raw amounts and unit ratios, key and
//! signature types, network identifiers, and wire endpoints.

pub mod account;
pub mod amount;
pub mod endpoint;
pub mod error;
pub mod hash;
pub mod keys;
pub mod network;

pub use account::Account;
pub use amount::{Amount, GRAZE_RATIO, MRAZE_RATIO, RAZE_RATIO};
pub use endpoint::Endpoint;
pub use error::TypeError;
pub use hash::BlockHash;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
