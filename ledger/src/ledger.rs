//! Ledger validation, application, rollback, and weight arithmetic.

use raze_crypto::verify_digest;
use raze_types::{Account, Amount, BlockHash, PrivateKey, PublicKey};
use tracing::debug;

use crate::block::Block;
use crate::error::LedgerError;
use crate::store::{AccountInfo, PendingInfo, StoreInner};
use crate::vote::{Vote, VoteCode, VoteResult, Votes};

/// Outcome of processing one block. Not errors: every code other than
/// `Progress` drives a state transition in the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Applied to the ledger.
    Progress,
    /// Already present.
    Old,
    /// The named previous block is unknown.
    GapPrevious,
    /// The claimed source send is unknown.
    GapSource,
    /// Signature does not verify against the chain owner.
    BadSignature,
    /// Send would increase the balance.
    NegativeSpend,
    /// Source exists but there is nothing pending to claim.
    Unreceivable,
    /// Source exists but is not a send block.
    NotReceiveFromSend,
    /// A sibling already occupies this root.
    Fork,
    /// Open block's account differs from the send's destination.
    AccountMismatch,
    /// Attempt to open the burn account.
    OpenedBurnAccount,
}

/// `process` result: the code plus progress metadata.
#[derive(Clone, Debug)]
pub struct ProcessReturn {
    pub code: ProcessResult,
    pub account: Account,
    pub amount: Amount,
    /// For sends: the destination whose pending set grew.
    pub pending_account: Account,
}

impl ProcessReturn {
    fn code(code: ProcessResult) -> Self {
        Self {
            code,
            account: Account::BURN,
            amount: Amount::ZERO,
            pending_account: Account::BURN,
        }
    }
}

/// Validation and application rules over a [`StoreInner`] transaction.
pub struct Ledger {
    genesis_amount: Amount,
    inactive_supply: Amount,
}

impl Ledger {
    pub fn new(genesis_amount: Amount, inactive_supply: Amount) -> Self {
        Self {
            genesis_amount,
            inactive_supply,
        }
    }

    /// Validate `block` against the ledger and apply it when valid.
    pub fn process(&self, txn: &mut StoreInner, block: &Block) -> ProcessReturn {
        let hash = block.hash();
        if txn.block_exists(&hash) {
            return ProcessReturn::code(ProcessResult::Old);
        }
        match block {
            Block::Open(open) => self.process_open(txn, block, open.clone(), hash),
            _ => self.process_chained(txn, block, hash),
        }
    }

    fn process_open(
        &self,
        txn: &mut StoreInner,
        block: &Block,
        open: crate::block::OpenBlock,
        hash: BlockHash,
    ) -> ProcessReturn {
        if open.account.is_burn() {
            return ProcessReturn::code(ProcessResult::OpenedBurnAccount);
        }
        if !verify_digest(
            hash.as_bytes(),
            block.signature(),
            &PublicKey(*open.account.as_bytes()),
        ) {
            return ProcessReturn::code(ProcessResult::BadSignature);
        }
        if txn.account_get(&open.account).is_some() {
            // A second open for the same account competes for the open root.
            return ProcessReturn::code(ProcessResult::Fork);
        }
        let source = match txn.block_get(&open.source) {
            None => return ProcessReturn::code(ProcessResult::GapSource),
            Some(Block::Send(send)) => send.clone(),
            Some(_) => return ProcessReturn::code(ProcessResult::NotReceiveFromSend),
        };
        if source.destination != open.account {
            return ProcessReturn::code(ProcessResult::AccountMismatch);
        }
        let Some(pending) = txn.pending_del(&open.account, &open.source) else {
            return ProcessReturn::code(ProcessResult::Unreceivable);
        };

        let amount = pending.amount;
        txn.block_put(hash, block.clone(), open.account, amount);
        txn.receiver_put(open.source, hash);
        txn.account_put(
            open.account,
            AccountInfo {
                head: hash,
                representative: open.representative,
                balance: amount,
                open_block: hash,
            },
        );
        txn.representation_add(open.representative, amount);
        ProcessReturn {
            code: ProcessResult::Progress,
            account: open.account,
            amount,
            pending_account: Account::BURN,
        }
    }

    fn process_chained(&self, txn: &mut StoreInner, block: &Block, hash: BlockHash) -> ProcessReturn {
        let previous = block.previous();
        if !txn.block_exists(&previous) {
            return ProcessReturn::code(ProcessResult::GapPrevious);
        }
        // The previous block exists, so its owning account is known.
        let account = match txn.block_account(&previous) {
            Some(account) => account,
            None => return ProcessReturn::code(ProcessResult::GapPrevious),
        };
        if !verify_digest(
            hash.as_bytes(),
            block.signature(),
            &PublicKey(*account.as_bytes()),
        ) {
            return ProcessReturn::code(ProcessResult::BadSignature);
        }
        let info = match txn.account_get(&account) {
            Some(info) => info.clone(),
            None => return ProcessReturn::code(ProcessResult::GapPrevious),
        };
        if info.head != previous {
            // Previous is stored but already extended by a sibling.
            return ProcessReturn::code(ProcessResult::Fork);
        }

        match block {
            Block::Send(send) => {
                if send.balance > info.balance {
                    return ProcessReturn::code(ProcessResult::NegativeSpend);
                }
                let amount = info.balance - send.balance;
                txn.block_put(hash, block.clone(), account, send.balance);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: hash,
                        balance: send.balance,
                        ..info.clone()
                    },
                );
                txn.representation_sub(info.representative, amount);
                txn.pending_put(
                    send.destination,
                    hash,
                    PendingInfo {
                        source: account,
                        amount,
                    },
                );
                ProcessReturn {
                    code: ProcessResult::Progress,
                    account,
                    amount,
                    pending_account: send.destination,
                }
            }
            Block::Receive(receive) => {
                let source = match txn.block_get(&receive.source) {
                    None => return ProcessReturn::code(ProcessResult::GapSource),
                    Some(Block::Send(_)) => receive.source,
                    Some(_) => return ProcessReturn::code(ProcessResult::NotReceiveFromSend),
                };
                let Some(pending) = txn.pending_del(&account, &source) else {
                    return ProcessReturn::code(ProcessResult::Unreceivable);
                };
                let amount = pending.amount;
                let balance = info.balance.saturating_add(amount);
                txn.block_put(hash, block.clone(), account, balance);
                txn.receiver_put(source, hash);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: hash,
                        balance,
                        ..info.clone()
                    },
                );
                txn.representation_add(info.representative, amount);
                ProcessReturn {
                    code: ProcessResult::Progress,
                    account,
                    amount,
                    pending_account: Account::BURN,
                }
            }
            Block::Change(change) => {
                txn.block_put(hash, block.clone(), account, info.balance);
                txn.representation_sub(info.representative, info.balance);
                txn.representation_add(change.representative, info.balance);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: hash,
                        representative: change.representative,
                        ..info.clone()
                    },
                );
                ProcessReturn {
                    code: ProcessResult::Progress,
                    account,
                    amount: Amount::ZERO,
                    pending_account: Account::BURN,
                }
            }
            Block::Open(_) => unreachable!("open blocks handled by process_open"),
        }
    }

    /// Undo blocks from the owning account's head down to and including
    /// `hash`. Dependent chains that received sends being undone are rolled
    /// back first. Returns the rolled-back hashes, head first.
    pub fn rollback(&self, txn: &mut StoreInner, hash: BlockHash) -> Result<Vec<BlockHash>, LedgerError> {
        let account = txn
            .block_account(&hash)
            .ok_or(LedgerError::UnknownBlock(hash))?;
        let mut rolled = Vec::new();
        // Each iteration removes the current head, so this walks down to `hash`.
        for _ in 0..1_000_000u32 {
            if !txn.block_exists(&hash) {
                return Ok(rolled);
            }
            let head = txn
                .account_get(&account)
                .ok_or(LedgerError::MissingAccount(hash))?
                .head;
            self.rollback_one(txn, head, &mut rolled)?;
            if head == hash {
                return Ok(rolled);
            }
        }
        Err(LedgerError::RollbackTooDeep(hash))
    }

    fn rollback_one(
        &self,
        txn: &mut StoreInner,
        hash: BlockHash,
        rolled: &mut Vec<BlockHash>,
    ) -> Result<(), LedgerError> {
        let block = txn
            .block_get(&hash)
            .cloned()
            .ok_or(LedgerError::UnknownBlock(hash))?;
        let account = txn
            .block_account(&hash)
            .ok_or(LedgerError::MissingAccount(hash))?;
        let info = txn
            .account_get(&account)
            .cloned()
            .ok_or(LedgerError::MissingAccount(hash))?;
        debug_assert_eq!(info.head, hash, "rollback must start at the chain head");

        match &block {
            Block::Send(send) => {
                // If the destination already claimed this send, undo the
                // claiming chain first so the pending entry reappears.
                if txn.pending_get(&send.destination, &hash).is_none() {
                    if let Some(receiver) = txn.receiver_get(&hash) {
                        let mut nested = self.rollback(txn, receiver)?;
                        rolled.append(&mut nested);
                    }
                }
                let previous_balance = txn
                    .block_balance(&send.previous)
                    .ok_or(LedgerError::UnknownBlock(send.previous))?;
                let amount = previous_balance.saturating_sub(send.balance);
                txn.pending_del(&send.destination, &hash);
                txn.representation_add(info.representative, amount);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: send.previous,
                        balance: previous_balance,
                        ..info
                    },
                );
            }
            Block::Receive(receive) => {
                let previous_balance = txn
                    .block_balance(&receive.previous)
                    .ok_or(LedgerError::UnknownBlock(receive.previous))?;
                let amount = info.balance.saturating_sub(previous_balance);
                let sender = txn
                    .block_account(&receive.source)
                    .ok_or(LedgerError::UnknownBlock(receive.source))?;
                txn.pending_put(
                    account,
                    receive.source,
                    PendingInfo {
                        source: sender,
                        amount,
                    },
                );
                txn.receiver_del(&receive.source);
                txn.representation_sub(info.representative, amount);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: receive.previous,
                        balance: previous_balance,
                        ..info
                    },
                );
            }
            Block::Open(open) => {
                let amount = info.balance;
                let sender = txn
                    .block_account(&open.source)
                    .ok_or(LedgerError::UnknownBlock(open.source))?;
                txn.pending_put(
                    account,
                    open.source,
                    PendingInfo {
                        source: sender,
                        amount,
                    },
                );
                txn.receiver_del(&open.source);
                txn.representation_sub(open.representative, amount);
                txn.account_del(&account);
            }
            Block::Change(change) => {
                let restored = self
                    .representative_at(txn, change.previous)
                    .ok_or(LedgerError::UnknownBlock(change.previous))?;
                txn.representation_sub(change.representative, info.balance);
                txn.representation_add(restored, info.balance);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: change.previous,
                        representative: restored,
                        ..info
                    },
                );
            }
        }
        txn.block_del(&hash);
        rolled.push(hash);
        debug!(block = %hash, "rolled back");
        Ok(())
    }

    /// The representative in effect at `hash` (nearest open/change at or
    /// before it in the chain).
    fn representative_at(&self, txn: &StoreInner, mut hash: BlockHash) -> Option<Account> {
        loop {
            match txn.block_get(&hash)? {
                Block::Open(open) => return Some(open.representative),
                Block::Change(change) => return Some(change.representative),
                other => hash = other.previous(),
            }
        }
    }

    /// The block currently occupying `root`: the stored successor of a
    /// previous-hash root, or the open block of an account root.
    pub fn successor(&self, txn: &StoreInner, root: BlockHash) -> Option<Block> {
        if let Some(hash) = txn.successor(&root) {
            return txn.block_get(&hash).cloned();
        }
        let info = txn.account_get(&Account::from(root))?;
        txn.block_get(&info.open_block).cloned()
    }

    /// Voting weight delegated to `account`.
    pub fn weight(&self, txn: &StoreInner, account: &Account) -> Amount {
        txn.representation_get(account)
    }

    /// Circulating supply used to scale consensus thresholds: the genesis
    /// amount less burnt funds and the configured inactive fraction.
    pub fn supply(&self, txn: &StoreInner) -> Amount {
        let burnt = txn.pending_total(&Account::BURN);
        self.genesis_amount
            .saturating_sub(burnt)
            .saturating_sub(self.inactive_supply)
    }

    pub fn latest(&self, txn: &StoreInner, account: &Account) -> Option<BlockHash> {
        txn.account_get(account).map(|info| info.head)
    }

    pub fn account_balance(&self, txn: &StoreInner, account: &Account) -> Amount {
        txn.account_get(account)
            .map(|info| info.balance)
            .unwrap_or(Amount::ZERO)
    }

    /// Weigh every voted block; heaviest first, ties broken toward the
    /// smaller hash so all nodes agree on the order.
    pub fn tally(&self, txn: &StoreInner, votes: &Votes) -> Vec<(Amount, Block)> {
        let mut weights: Vec<(Amount, BlockHash, Block)> = Vec::new();
        for vote in votes.rep_votes.values() {
            let weight = self.weight(txn, &vote.account);
            let hash = vote.block.hash();
            match weights.iter_mut().find(|(_, h, _)| *h == hash) {
                Some((total, _, _)) => *total = total.saturating_add(weight),
                None => weights.push((weight, hash, vote.block.clone())),
            }
        }
        weights.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        weights
            .into_iter()
            .map(|(weight, _, block)| (weight, block))
            .collect()
    }

    /// The tally leader.
    pub fn winner(&self, txn: &StoreInner, votes: &Votes) -> (Amount, Block) {
        let mut tally = self.tally(txn, votes);
        debug_assert!(!tally.is_empty(), "votes are seeded with their block");
        tally.remove(0)
    }

    /// Classify an incoming vote and update the per-account replay state.
    pub fn vote_validate(&self, txn: &mut StoreInner, vote: &Vote) -> VoteResult {
        let code = vote.validate_signature();
        if code == VoteCode::Invalid {
            return VoteResult {
                code,
                vote: vote.clone(),
            };
        }
        if let Some(stored) = txn.vote_get(&vote.account) {
            if stored.sequence >= vote.sequence {
                return VoteResult {
                    code: VoteCode::Replay,
                    vote: stored.clone(),
                };
            }
        }
        txn.vote_put(vote.account, vote.clone());
        VoteResult {
            code,
            vote: vote.clone(),
        }
    }

    /// Produce this node's votes for `block` under both digests, advancing
    /// the account's sequence.
    pub fn vote_generate(
        &self,
        txn: &mut StoreInner,
        public: &PublicKey,
        private: &PrivateKey,
        block: Block,
    ) -> (Vote, Vote) {
        let account = Account::new(public.0);
        let sequence = txn.vote_sequence_next(&account);
        let legacy = Vote::new_legacy(account, private, sequence, block.clone());
        let current = Vote::new(account, private, sequence, block);
        txn.vote_put(account, current.clone());
        (legacy, current)
    }
}
