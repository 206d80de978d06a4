//! Transactional in-memory store behind the ledger.
//!
//! The store provides the same shape a persistent key-value environment
//! would: explicit read/write transactions, tables keyed by hash and by
//! account, and an unchecked table for blocks whose dependencies have not
//! arrived. Writers exclude each other; the block processor is the only
//! long-lived writer and holds its transaction for at most one drained
//! batch.

use raze_types::{Account, Amount, BlockHash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::block::Block;
use crate::vote::Vote;

/// Per-account chain head state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub head: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    pub open_block: BlockHash,
}

/// An unclaimed send waiting for its destination to receive it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInfo {
    /// Account that issued the send.
    pub source: Account,
    pub amount: Amount,
}

/// All ledger tables. Obtained through [`Store::read`] / [`Store::write`].
#[derive(Default)]
pub struct StoreInner {
    blocks: HashMap<BlockHash, Block>,
    block_account: HashMap<BlockHash, Account>,
    block_balance: HashMap<BlockHash, Amount>,
    successors: HashMap<BlockHash, BlockHash>,
    accounts: HashMap<Account, AccountInfo>,
    pending: HashMap<(Account, BlockHash), PendingInfo>,
    unchecked: HashMap<BlockHash, Vec<Block>>,
    votes: HashMap<Account, Vote>,
    representation: HashMap<Account, Amount>,
    /// send hash → the receive/open block that claimed it. Lets rollback
    /// cascade into dependent chains without scanning.
    receivers: HashMap<BlockHash, BlockHash>,
}

impl StoreInner {
    // -- Blocks ---------------------------------------------------------------

    pub fn block_put(&mut self, hash: BlockHash, block: Block, account: Account, balance: Amount) {
        if !block.previous().is_zero() {
            self.successors.insert(block.previous(), hash);
        }
        self.blocks.insert(hash, block);
        self.block_account.insert(hash, account);
        self.block_balance.insert(hash, balance);
    }

    /// Replace a stored block's contents without touching chain linkage.
    /// Used when a duplicate arrives with a higher work value.
    pub fn block_replace(&mut self, hash: BlockHash, block: Block) {
        self.blocks.insert(hash, block);
    }

    pub fn block_del(&mut self, hash: &BlockHash) {
        if let Some(block) = self.blocks.remove(hash) {
            if !block.previous().is_zero() {
                self.successors.remove(&block.previous());
            }
        }
        self.block_account.remove(hash);
        self.block_balance.remove(hash);
    }

    pub fn block_get(&self, hash: &BlockHash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn block_exists(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Pick a stored block by sample index (callers supply the randomness).
    pub fn block_sample(&self, index: usize) -> Option<&Block> {
        if self.blocks.is_empty() {
            return None;
        }
        self.blocks.values().nth(index % self.blocks.len())
    }

    pub fn block_account(&self, hash: &BlockHash) -> Option<Account> {
        self.block_account.get(hash).copied()
    }

    pub fn block_balance(&self, hash: &BlockHash) -> Option<Amount> {
        self.block_balance.get(hash).copied()
    }

    pub fn successor(&self, hash: &BlockHash) -> Option<BlockHash> {
        self.successors.get(hash).copied()
    }

    // -- Accounts -------------------------------------------------------------

    pub fn account_put(&mut self, account: Account, info: AccountInfo) {
        self.accounts.insert(account, info);
    }

    pub fn account_get(&self, account: &Account) -> Option<&AccountInfo> {
        self.accounts.get(account)
    }

    pub fn account_del(&mut self, account: &Account) {
        self.accounts.remove(account);
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn accounts_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    // -- Pending sends --------------------------------------------------------

    pub fn pending_put(&mut self, destination: Account, send: BlockHash, info: PendingInfo) {
        self.pending.insert((destination, send), info);
    }

    pub fn pending_get(&self, destination: &Account, send: &BlockHash) -> Option<&PendingInfo> {
        self.pending.get(&(*destination, *send))
    }

    pub fn pending_del(&mut self, destination: &Account, send: &BlockHash) -> Option<PendingInfo> {
        self.pending.remove(&(*destination, *send))
    }

    /// Total raw amount pending for an account (unclaimed sends).
    pub fn pending_total(&self, destination: &Account) -> Amount {
        self.pending
            .iter()
            .filter(|((dest, _), _)| dest == destination)
            .fold(Amount::ZERO, |acc, (_, info)| acc.saturating_add(info.amount))
    }

    // -- Unchecked blocks -----------------------------------------------------

    pub fn unchecked_put(&mut self, dependency: BlockHash, block: Block) {
        let entry = self.unchecked.entry(dependency).or_default();
        let hash = block.hash();
        if entry.iter().all(|b| b.hash() != hash) {
            entry.push(block);
        }
    }

    /// Drain every block stashed against `dependency`.
    pub fn unchecked_take(&mut self, dependency: &BlockHash) -> Vec<Block> {
        self.unchecked.remove(dependency).unwrap_or_default()
    }

    pub fn unchecked_count(&self) -> usize {
        self.unchecked.values().map(Vec::len).sum()
    }

    // -- Votes ----------------------------------------------------------------

    pub fn vote_get(&self, account: &Account) -> Option<&Vote> {
        self.votes.get(account)
    }

    pub fn vote_put(&mut self, account: Account, vote: Vote) {
        self.votes.insert(account, vote);
    }

    /// Next sequence number for an account's votes.
    pub fn vote_sequence_next(&self, account: &Account) -> u64 {
        self.votes.get(account).map_or(1, |v| v.sequence + 1)
    }

    // -- Representation weights ----------------------------------------------

    pub fn representation_get(&self, account: &Account) -> Amount {
        self.representation
            .get(account)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn representation_add(&mut self, account: Account, amount: Amount) {
        let current = self.representation_get(&account);
        self.representation
            .insert(account, current.saturating_add(amount));
    }

    pub fn representation_sub(&mut self, account: Account, amount: Amount) {
        let current = self.representation_get(&account);
        self.representation
            .insert(account, current.saturating_sub(amount));
    }

    // -- Receiver links (rollback cascade) ------------------------------------

    pub fn receiver_put(&mut self, send: BlockHash, receiver: BlockHash) {
        self.receivers.insert(send, receiver);
    }

    pub fn receiver_get(&self, send: &BlockHash) -> Option<BlockHash> {
        self.receivers.get(send).copied()
    }

    pub fn receiver_del(&mut self, send: &BlockHash) {
        self.receivers.remove(send);
    }
}

/// Shared store handle; one writer at a time, readers in parallel.
#[derive(Default)]
pub struct Store {
    inner: RwLock<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a read transaction.
    pub fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a write transaction. Writers exclude each other and all readers.
    pub fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, SendBlock};
    use raze_crypto::keypair_from_seed;

    fn hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn account(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    fn sample_block(prev: u8) -> Block {
        let kp = keypair_from_seed(&[1u8; 32]);
        Block::Send(SendBlock::new(
            hash(prev),
            account(2),
            Amount::new(10),
            &kp.private,
            0,
        ))
    }

    #[test]
    fn block_put_records_successor() {
        let store = Store::new();
        let mut txn = store.write();
        let block = sample_block(9);
        let h = block.hash();
        txn.block_put(h, block, account(1), Amount::new(10));
        assert!(txn.block_exists(&h));
        assert_eq!(txn.successor(&hash(9)), Some(h));
        assert_eq!(txn.block_account(&h), Some(account(1)));
    }

    #[test]
    fn block_del_clears_linkage() {
        let store = Store::new();
        let mut txn = store.write();
        let block = sample_block(9);
        let h = block.hash();
        txn.block_put(h, block, account(1), Amount::new(10));
        txn.block_del(&h);
        assert!(!txn.block_exists(&h));
        assert_eq!(txn.successor(&hash(9)), None);
        assert_eq!(txn.block_balance(&h), None);
    }

    #[test]
    fn pending_roundtrip() {
        let store = Store::new();
        let mut txn = store.write();
        let info = PendingInfo {
            source: account(1),
            amount: Amount::new(500),
        };
        txn.pending_put(account(2), hash(3), info.clone());
        assert_eq!(txn.pending_get(&account(2), &hash(3)), Some(&info));
        assert_eq!(txn.pending_total(&account(2)), Amount::new(500));
        assert_eq!(txn.pending_del(&account(2), &hash(3)), Some(info));
        assert_eq!(txn.pending_get(&account(2), &hash(3)), None);
    }

    #[test]
    fn unchecked_deduplicates_by_hash() {
        let store = Store::new();
        let mut txn = store.write();
        let block = sample_block(4);
        txn.unchecked_put(hash(4), block.clone());
        txn.unchecked_put(hash(4), block);
        assert_eq!(txn.unchecked_count(), 1);
        assert_eq!(txn.unchecked_take(&hash(4)).len(), 1);
        assert_eq!(txn.unchecked_count(), 0);
    }

    #[test]
    fn representation_saturates_at_zero() {
        let store = Store::new();
        let mut txn = store.write();
        txn.representation_add(account(1), Amount::new(100));
        txn.representation_sub(account(1), Amount::new(150));
        assert_eq!(txn.representation_get(&account(1)), Amount::ZERO);
    }

    #[test]
    fn vote_sequence_starts_at_one() {
        let store = Store::new();
        let txn = store.read();
        assert_eq!(txn.vote_sequence_next(&account(1)), 1);
    }

    #[test]
    fn block_sample_none_when_empty() {
        let store = Store::new();
        let txn = store.read();
        assert!(txn.block_sample(17).is_none());
    }
}
