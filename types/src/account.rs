//! Account identifiers.
//!
//! An account is a 32-byte Ed25519 public key. The all-zero account is the
//! burn account: funds sent there are permanently destroyed and opening it
//! is rejected by the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;
use crate::hash::{decode_hex_32, BlockHash};

/// A 32-byte account identifier (Ed25519 public key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Default for Account {
    fn default() -> Self {
        Self::BURN
    }
}

impl Account {
    /// The burn account. Sends to it destroy funds; it can never be opened.
    pub const BURN: Self = Self([0u8; 32]);

    /// Sentinel that no key holder can own. Seeds election tallies so the
    /// block under election is always tallied, at zero weight.
    pub const SENTINEL: Self = Self([0xFF; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_burn(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Reinterpret as a block hash. Open-block roots are the account itself.
    pub fn into_root(self) -> BlockHash {
        BlockHash::new(self.0)
    }
}

impl From<BlockHash> for Account {
    fn from(hash: BlockHash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl FromStr for Account {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_hex_32(s)?))
    }
}
