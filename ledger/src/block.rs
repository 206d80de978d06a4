//! Block variants, hashing, and wire codecs.
//!
//! A block is immutable once built. Its hash covers the variant-specific
//! hashable fields in wire order; signature and work are excluded so a block
//! can be re-signed or re-mined without changing identity. Wire layouts are
//! fixed-size per variant and must stay bit-exact for interoperability.

use raze_crypto::{blake2b_256_multi, sign_digest};
use raze_types::{Account, Amount, BlockHash, PrivateKey, Signature};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Discriminates block variants on the wire (header `block_type` byte).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    Invalid,
    NotABlock,
    Send,
    Receive,
    Open,
    Change,
}

impl BlockType {
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::NotABlock => 1,
            Self::Send => 2,
            Self::Receive => 3,
            Self::Open => 4,
            Self::Change => 5,
        }
    }

    pub fn from_wire(code: u8) -> Result<Self, LedgerError> {
        match code {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::NotABlock),
            2 => Ok(Self::Send),
            3 => Ok(Self::Receive),
            4 => Ok(Self::Open),
            5 => Ok(Self::Change),
            other => Err(LedgerError::UnknownBlockType(other)),
        }
    }

    /// Serialized payload size (hashables + signature + work), if this code
    /// names a concrete block variant.
    pub fn wire_size(self) -> Option<usize> {
        match self {
            Self::Send => Some(80 + 72),
            Self::Receive => Some(64 + 72),
            Self::Open => Some(96 + 72),
            Self::Change => Some(64 + 72),
            Self::Invalid | Self::NotABlock => None,
        }
    }
}

/// Transfers funds out of an account. `balance` is the balance *after* the
/// send; the amount is the difference from the previous balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: Account,
    pub balance: Amount,
    pub signature: Signature,
    pub work: u64,
}

/// Claims a pending send into an existing account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveBlock {
    pub previous: BlockHash,
    pub source: BlockHash,
    pub signature: Signature,
    pub work: u64,
}

/// The first block of an account chain; claims the send that funded it and
/// names the account's representative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: Account,
    pub account: Account,
    pub signature: Signature,
    pub work: u64,
}

/// Redelegates an account's weight to a different representative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: Account,
    pub signature: Signature,
    pub work: u64,
}

/// One immutable ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
}

impl SendBlock {
    pub fn new(
        previous: BlockHash,
        destination: Account,
        balance: Amount,
        private: &PrivateKey,
        work: u64,
    ) -> Self {
        let mut block = Self {
            previous,
            destination,
            balance,
            signature: Signature::ZERO,
            work,
        };
        block.signature = sign_digest(Block::Send(block.clone()).hash().as_bytes(), private);
        block
    }
}

impl ReceiveBlock {
    pub fn new(previous: BlockHash, source: BlockHash, private: &PrivateKey, work: u64) -> Self {
        let mut block = Self {
            previous,
            source,
            signature: Signature::ZERO,
            work,
        };
        block.signature = sign_digest(Block::Receive(block.clone()).hash().as_bytes(), private);
        block
    }
}

impl OpenBlock {
    pub fn new(
        source: BlockHash,
        representative: Account,
        account: Account,
        private: &PrivateKey,
        work: u64,
    ) -> Self {
        let mut block = Self {
            source,
            representative,
            account,
            signature: Signature::ZERO,
            work,
        };
        block.signature = sign_digest(Block::Open(block.clone()).hash().as_bytes(), private);
        block
    }
}

impl ChangeBlock {
    pub fn new(
        previous: BlockHash,
        representative: Account,
        private: &PrivateKey,
        work: u64,
    ) -> Self {
        let mut block = Self {
            previous,
            representative,
            signature: Signature::ZERO,
            work,
        };
        block.signature = sign_digest(Block::Change(block.clone()).hash().as_bytes(), private);
        block
    }
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Send(_) => BlockType::Send,
            Self::Receive(_) => BlockType::Receive,
            Self::Open(_) => BlockType::Open,
            Self::Change(_) => BlockType::Change,
        }
    }

    /// Blake2b-256 over the hashable fields in wire order.
    pub fn hash(&self) -> BlockHash {
        let digest = match self {
            Self::Send(b) => blake2b_256_multi(&[
                b.previous.as_bytes(),
                b.destination.as_bytes(),
                &b.balance.to_be_bytes(),
            ]),
            Self::Receive(b) => blake2b_256_multi(&[b.previous.as_bytes(), b.source.as_bytes()]),
            Self::Open(b) => blake2b_256_multi(&[
                b.source.as_bytes(),
                b.representative.as_bytes(),
                b.account.as_bytes(),
            ]),
            Self::Change(b) => {
                blake2b_256_multi(&[b.previous.as_bytes(), b.representative.as_bytes()])
            }
        };
        BlockHash::new(digest)
    }

    /// The election key: the account for an open block, otherwise the
    /// previous block's hash.
    pub fn root(&self) -> BlockHash {
        match self {
            Self::Open(b) => b.account.into_root(),
            Self::Send(b) => b.previous,
            Self::Receive(b) => b.previous,
            Self::Change(b) => b.previous,
        }
    }

    /// Previous block in the owning chain; zero for open blocks.
    pub fn previous(&self) -> BlockHash {
        match self {
            Self::Open(_) => BlockHash::ZERO,
            Self::Send(b) => b.previous,
            Self::Receive(b) => b.previous,
            Self::Change(b) => b.previous,
        }
    }

    /// The originating send, for variants that claim one.
    pub fn source(&self) -> Option<BlockHash> {
        match self {
            Self::Receive(b) => Some(b.source),
            Self::Open(b) => Some(b.source),
            Self::Send(_) | Self::Change(_) => None,
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Self::Send(b) => b.work,
            Self::Receive(b) => b.work,
            Self::Open(b) => b.work,
            Self::Change(b) => b.work,
        }
    }

    pub fn set_work(&mut self, work: u64) {
        match self {
            Self::Send(b) => b.work = work,
            Self::Receive(b) => b.work = work,
            Self::Open(b) => b.work = work,
            Self::Change(b) => b.work = work,
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Self::Send(b) => &b.signature,
            Self::Receive(b) => &b.signature,
            Self::Open(b) => &b.signature,
            Self::Change(b) => &b.signature,
        }
    }

    /// Append the wire encoding (hashables, then signature, then work LE).
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Self::Send(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.destination.as_bytes());
                out.extend_from_slice(&b.balance.to_be_bytes());
                out.extend_from_slice(&b.signature.0);
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Self::Receive(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.source.as_bytes());
                out.extend_from_slice(&b.signature.0);
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Self::Open(b) => {
                out.extend_from_slice(b.source.as_bytes());
                out.extend_from_slice(b.representative.as_bytes());
                out.extend_from_slice(b.account.as_bytes());
                out.extend_from_slice(&b.signature.0);
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Self::Change(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.representative.as_bytes());
                out.extend_from_slice(&b.signature.0);
                out.extend_from_slice(&b.work.to_le_bytes());
            }
        }
    }

    /// Decode a block of a known type from `bytes`. Returns the block and
    /// the number of bytes consumed.
    pub fn deserialize(block_type: BlockType, bytes: &[u8]) -> Result<(Self, usize), LedgerError> {
        let size = block_type
            .wire_size()
            .ok_or(LedgerError::UnknownBlockType(block_type.to_wire()))?;
        if bytes.len() < size {
            return Err(LedgerError::TruncatedBlock {
                need: size,
                have: bytes.len(),
            });
        }
        let hash32 = |offset: usize| {
            let mut out = [0u8; 32];
            out.copy_from_slice(&bytes[offset..offset + 32]);
            out
        };
        let tail = |offset: usize| {
            let mut sig = [0u8; 64];
            sig.copy_from_slice(&bytes[offset..offset + 64]);
            let mut work = [0u8; 8];
            work.copy_from_slice(&bytes[offset + 64..offset + 72]);
            (Signature(sig), u64::from_le_bytes(work))
        };
        let block = match block_type {
            BlockType::Send => {
                let mut balance = [0u8; 16];
                balance.copy_from_slice(&bytes[64..80]);
                let (signature, work) = tail(80);
                Self::Send(SendBlock {
                    previous: BlockHash::new(hash32(0)),
                    destination: Account::new(hash32(32)),
                    balance: Amount::from_be_bytes(balance),
                    signature,
                    work,
                })
            }
            BlockType::Receive => {
                let (signature, work) = tail(64);
                Self::Receive(ReceiveBlock {
                    previous: BlockHash::new(hash32(0)),
                    source: BlockHash::new(hash32(32)),
                    signature,
                    work,
                })
            }
            BlockType::Open => {
                let (signature, work) = tail(96);
                Self::Open(OpenBlock {
                    source: BlockHash::new(hash32(0)),
                    representative: Account::new(hash32(32)),
                    account: Account::new(hash32(64)),
                    signature,
                    work,
                })
            }
            BlockType::Change => {
                let (signature, work) = tail(64);
                Self::Change(ChangeBlock {
                    previous: BlockHash::new(hash32(0)),
                    representative: Account::new(hash32(32)),
                    signature,
                    work,
                })
            }
            BlockType::Invalid | BlockType::NotABlock => unreachable!("sized above"),
        };
        Ok((block, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::keypair_from_seed;

    fn hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn account(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    #[test]
    fn hash_excludes_signature_and_work() {
        let kp = keypair_from_seed(&[1u8; 32]);
        let a = SendBlock::new(hash(1), account(2), Amount::new(10), &kp.private, 0);
        let mut b = a.clone();
        b.work = 0xDEAD_BEEF;
        b.signature = Signature([9u8; 64]);
        assert_eq!(Block::Send(a).hash(), Block::Send(b).hash());
    }

    #[test]
    fn hash_covers_every_hashable_field() {
        let kp = keypair_from_seed(&[1u8; 32]);
        let base = SendBlock::new(hash(1), account(2), Amount::new(10), &kp.private, 0);
        let mut other = base.clone();
        other.balance = Amount::new(11);
        assert_ne!(Block::Send(base).hash(), Block::Send(other).hash());
    }

    #[test]
    fn open_root_is_the_account() {
        let kp = keypair_from_seed(&[3u8; 32]);
        let open = OpenBlock::new(hash(7), account(8), account(9), &kp.private, 0);
        assert_eq!(Block::Open(open).root(), account(9).into_root());
    }

    #[test]
    fn non_open_root_is_previous() {
        let kp = keypair_from_seed(&[3u8; 32]);
        let change = ChangeBlock::new(hash(4), account(5), &kp.private, 0);
        assert_eq!(Block::Change(change).root(), hash(4));
    }

    #[test]
    fn serialize_roundtrip_all_variants() {
        let kp = keypair_from_seed(&[6u8; 32]);
        let blocks = [
            Block::Send(SendBlock::new(
                hash(1),
                account(2),
                Amount::new(1234),
                &kp.private,
                42,
            )),
            Block::Receive(ReceiveBlock::new(hash(3), hash(4), &kp.private, 43)),
            Block::Open(OpenBlock::new(hash(5), account(6), account(7), &kp.private, 44)),
            Block::Change(ChangeBlock::new(hash(8), account(9), &kp.private, 45)),
        ];
        for block in blocks {
            let mut bytes = Vec::new();
            block.serialize(&mut bytes);
            assert_eq!(bytes.len(), block.block_type().wire_size().unwrap());
            let (decoded, consumed) = Block::deserialize(block.block_type(), &bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(decoded, block);
        }
    }

    #[test]
    fn deserialize_rejects_truncated() {
        let result = Block::deserialize(BlockType::Send, &[0u8; 10]);
        assert!(matches!(result, Err(LedgerError::TruncatedBlock { .. })));
    }

    #[test]
    fn deserialize_rejects_non_block_types() {
        assert!(Block::deserialize(BlockType::NotABlock, &[0u8; 200]).is_err());
    }

    #[test]
    fn ctor_signature_verifies_against_hash() {
        let kp = keypair_from_seed(&[11u8; 32]);
        let block = Block::Send(SendBlock::new(
            hash(1),
            account(2),
            Amount::new(5),
            &kp.private,
            0,
        ));
        assert!(raze_crypto::verify_digest(
            block.hash().as_bytes(),
            block.signature(),
            &kp.public,
        ));
    }
}
