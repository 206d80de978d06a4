//! Blocks referenced only by votes.
//!
//! When a vote names a block we've stashed as unchecked (or never seen at
//! all), the gap cache tracks how much representative weight is behind it.
//! Enough weight means the network confirmed something we're missing and a
//! bootstrap is warranted. Entries are bounded and expire by arrival age.

use raze_ledger::{Block, Ledger, StoreInner, Vote, Votes};
use raze_types::{Amount, BlockHash};
use std::time::{Duration, Instant};

/// Entries kept at most; the oldest arrival is evicted beyond this.
const MAX_ENTRIES: usize = 256;

/// Entries older than this are dropped by `purge_old`.
const ENTRY_LIFETIME: Duration = Duration::from_secs(10);

struct GapInfo {
    arrival: Instant,
    hash: BlockHash,
    votes: Votes,
}

/// Arrival-ordered, hash-addressable cache of missing-dependency blocks.
pub struct GapCache {
    blocks: Vec<GapInfo>,
    bootstrap_fraction_numerator: u128,
}

impl GapCache {
    pub fn new(bootstrap_fraction_numerator: u128) -> Self {
        Self {
            blocks: Vec::new(),
            bootstrap_fraction_numerator,
        }
    }

    /// Track a block that failed with a gap; refreshes arrival when the
    /// block is already tracked.
    pub fn add(&mut self, block: &Block) {
        let hash = block.hash();
        match self.blocks.iter_mut().find(|info| info.hash == hash) {
            Some(info) => info.arrival = Instant::now(),
            None => {
                self.blocks.push(GapInfo {
                    arrival: Instant::now(),
                    hash,
                    votes: Votes::new(block),
                });
                if self.blocks.len() > MAX_ENTRIES {
                    if let Some(oldest) = self
                        .blocks
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, info)| info.arrival)
                        .map(|(index, _)| index)
                    {
                        self.blocks.swap_remove(oldest);
                    }
                }
            }
        }
    }

    /// Drop the entry for a block that made it into the ledger.
    pub fn erase(&mut self, hash: &BlockHash) {
        self.blocks.retain(|info| info.hash != *hash);
    }

    /// Weight that promotes a gap block to a bootstrap trigger.
    pub fn bootstrap_threshold(&self, ledger: &Ledger, txn: &StoreInner) -> Amount {
        Amount::new((ledger.supply(txn).raw() / 256) * self.bootstrap_fraction_numerator)
    }

    /// Fold a vote into the entry for its block, if tracked. Returns the
    /// block hash once the winning tally exceeds the bootstrap threshold.
    pub fn vote(&mut self, ledger: &Ledger, txn: &StoreInner, vote: &Vote) -> Option<BlockHash> {
        let hash = vote.block.hash();
        let threshold = self.bootstrap_threshold(ledger, txn);
        let info = self.blocks.iter_mut().find(|info| info.hash == hash)?;
        info.votes.vote(vote);
        let (weight, _) = ledger.winner(txn, &info.votes);
        (weight > threshold).then_some(hash)
    }

    /// Drop entries past their lifetime.
    pub fn purge_old(&mut self) {
        let cutoff = Instant::now() - ENTRY_LIFETIME;
        self.blocks.retain(|info| info.arrival >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
