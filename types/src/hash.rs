//! Block hash type for the account-chain lattice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// A 32-byte block hash. Also used for election roots, since a root is
/// either a previous-block hash or an account reinterpreted as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl FromStr for BlockHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_hex_32(s)?))
    }
}

/// Decode a 64-character hex string into 32 bytes.
pub(crate) fn decode_hex_32(s: &str) -> Result<[u8; 32], TypeError> {
    if s.len() != 64 || !s.is_ascii() {
        return Err(TypeError::InvalidHex(s.len()));
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        let pair = &s[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16).map_err(|_| TypeError::InvalidHex(s.len()))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_is_zero() {
        assert!(BlockHash::ZERO.is_zero());
        assert!(!BlockHash::new([1u8; 32]).is_zero());
    }

    #[test]
    fn display_roundtrip() {
        let h = BlockHash::new([0xAB; 32]);
        let s = h.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(s.parse::<BlockHash>().unwrap(), h);
    }

    #[test]
    fn parse_rejects_bad_length() {
        assert!("ABCD".parse::<BlockHash>().is_err());
    }

    #[test]
    fn parse_rejects_non_hex() {
        let s = "ZZ".repeat(32);
        assert!(s.parse::<BlockHash>().is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = BlockHash::new([1u8; 32]);
        let b = BlockHash::new([2u8; 32]);
        assert!(a < b);
    }
}
