//! Representative votes and per-root vote sets.
//!
//! A vote names an account, a strictly-increasing sequence number, and the
//! block the representative endorses for that block's root. Two digest
//! schemes coexist from the sequence-binding migration: the current digest
//! commits to the sequence number, the legacy digest covers only the block
//! hash. Validation accepts either; generation produces both so peers on
//! either side of the migration accept one of the pair.

use raze_crypto::{blake2b_256_multi, sign_digest, verify_digest};
use raze_types::{Account, BlockHash, PrivateKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::block::{Block, BlockType};
use crate::error::LedgerError;

/// Classification of an incoming vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteCode {
    /// Signature does not verify under either digest.
    Invalid,
    /// Signature valid but the sequence is not newer than the stored one.
    Replay,
    /// Valid under the legacy digest.
    Vote,
    /// Valid under the current (sequence-binding) digest.
    Vote2,
}

/// Result of `vote_validate`: the classification plus the highest vote we
/// hold for the account (the incoming one when accepted, the stored one on
/// replay — used to echo our newer vote back to stale peers).
#[derive(Clone, Debug)]
pub struct VoteResult {
    pub code: VoteCode,
    pub vote: Vote,
}

/// A representative's endorsement of one block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub account: Account,
    pub signature: Signature,
    pub sequence: u64,
    pub block: Block,
}

impl Vote {
    /// Build a vote signed under the current digest.
    pub fn new(account: Account, private: &PrivateKey, sequence: u64, block: Block) -> Self {
        let mut vote = Self {
            account,
            signature: Signature::ZERO,
            sequence,
            block,
        };
        vote.signature = sign_digest(&vote.digest(), private);
        vote
    }

    /// Build a vote signed under the legacy digest.
    pub fn new_legacy(account: Account, private: &PrivateKey, sequence: u64, block: Block) -> Self {
        let mut vote = Self {
            account,
            signature: Signature::ZERO,
            sequence,
            block,
        };
        vote.signature = sign_digest(&vote.digest_legacy(), private);
        vote
    }

    /// Current digest: Blake2b-256(block hash ‖ sequence LE).
    pub fn digest(&self) -> [u8; 32] {
        blake2b_256_multi(&[self.block.hash().as_bytes(), &self.sequence.to_le_bytes()])
    }

    /// Legacy digest: Blake2b-256(block hash).
    pub fn digest_legacy(&self) -> [u8; 32] {
        blake2b_256_multi(&[self.block.hash().as_bytes()])
    }

    /// Verify the signature, preferring the current digest.
    pub fn validate_signature(&self) -> VoteCode {
        let key = PublicKey(*self.account.as_bytes());
        if verify_digest(&self.digest(), &self.signature, &key) {
            VoteCode::Vote2
        } else if verify_digest(&self.digest_legacy(), &self.signature, &key) {
            VoteCode::Vote
        } else {
            VoteCode::Invalid
        }
    }

    /// Wire layout: account(32) ‖ signature(64) ‖ sequence(8 LE) ‖ block.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(&self.signature.0);
        out.extend_from_slice(&self.sequence.to_le_bytes());
        self.block.serialize(out);
    }

    pub fn deserialize(block_type: BlockType, bytes: &[u8]) -> Result<(Self, usize), LedgerError> {
        const HEAD: usize = 32 + 64 + 8;
        if bytes.len() < HEAD {
            return Err(LedgerError::TruncatedBlock {
                need: HEAD,
                have: bytes.len(),
            });
        }
        let mut account = [0u8; 32];
        account.copy_from_slice(&bytes[..32]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[32..96]);
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&bytes[96..HEAD]);
        let (block, consumed) = Block::deserialize(block_type, &bytes[HEAD..])?;
        Ok((
            Self {
                account: Account::new(account),
                signature: Signature(signature),
                sequence: u64::from_le_bytes(sequence),
                block,
            },
            HEAD + consumed,
        ))
    }
}

/// Latest vote per representative for one election root.
///
/// Seeded with the block that created the election under [`Account::SENTINEL`]
/// (weight zero) so a tally is never empty and the seed block is always a
/// candidate.
#[derive(Clone, Debug)]
pub struct Votes {
    /// The election root these votes apply to.
    pub id: BlockHash,
    pub rep_votes: HashMap<Account, Vote>,
}

impl Votes {
    pub fn new(block: &Block) -> Self {
        let seed = Vote {
            account: Account::SENTINEL,
            signature: Signature::ZERO,
            sequence: 0,
            block: block.clone(),
        };
        let mut rep_votes = HashMap::new();
        rep_votes.insert(Account::SENTINEL, seed);
        Self {
            id: block.root(),
            rep_votes,
        }
    }

    /// Record a vote; an existing entry is replaced only by a strictly
    /// higher sequence. Returns whether the set changed.
    pub fn vote(&mut self, vote: &Vote) -> bool {
        match self.rep_votes.get(&vote.account) {
            Some(existing) if vote.sequence <= existing.sequence => false,
            _ => {
                self.rep_votes.insert(vote.account, vote.clone());
                true
            }
        }
    }

    /// Number of real representative votes (excludes the seed entry).
    pub fn voter_count(&self) -> usize {
        self.rep_votes.len().saturating_sub(1)
    }
}
