//! The election container and announcement-loop bookkeeping.
//!
//! Roots iterate in hash order so every node works the same prefix of a
//! fork flood; roots beyond the per-interval budget have their announcement
//! counters reset, which rate-limits fork resolution traffic.

use raze_ledger::{Block, Ledger, StoreInner, Vote};
use raze_types::BlockHash;
use std::collections::BTreeMap;
use tracing::debug;

use crate::election::{Confirmation, Election};

/// Announce winners for at most this many roots per interval.
const ANNOUNCEMENTS_PER_INTERVAL: usize = 20;

/// After this many announcements an election is cut off and decided on
/// whatever tally it has.
const CONTIGIOUS_ANNOUNCEMENTS: u32 = 4;

/// One conflict root under election.
struct ConflictInfo {
    election: Election,
    announcements: u32,
}

/// What one announcement interval decided; the node performs the sends.
#[derive(Default)]
pub struct AnnounceOutcome {
    /// Winners to rebroadcast, in root order.
    pub broadcasts: Vec<Block>,
    /// Elections that hit the announcement cutoff this interval.
    pub confirmations: Vec<Confirmation>,
    /// A root has been announced more than once with no votes arriving; we
    /// are probably isolated and should synchronize.
    pub bootstrap_needed: bool,
}

/// What routing one vote decided.
#[derive(Default)]
pub struct VoteOutcome {
    /// An election for the vote's root exists and absorbed the vote.
    pub routed: bool,
    /// The vote passed the spacing and weight gates; flood it.
    pub republish: bool,
    /// The vote completed a quorum.
    pub confirmation: Option<Confirmation>,
}

/// All elections, keyed by root. One election per root at a time.
#[derive(Default)]
pub struct ActiveTransactions {
    roots: BTreeMap<BlockHash, ConflictInfo>,
}

impl ActiveTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an election for `block` unless its root already has one.
    /// Returns `true` when an election already existed.
    pub fn start(&mut self, block: &Block) -> bool {
        let root = block.root();
        if self.roots.contains_key(&root) {
            return true;
        }
        debug!(%root, block = %block.hash(), "election started");
        self.roots.insert(
            root,
            ConflictInfo {
                election: Election::new(block),
                announcements: 0,
            },
        );
        false
    }

    pub fn active(&self, root: &BlockHash) -> bool {
        self.roots.contains_key(root)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Route a validated vote to the election for its block's root.
    pub fn vote(&mut self, ledger: &Ledger, txn: &StoreInner, vote: &Vote) -> VoteOutcome {
        let root = vote.block.root();
        let Some(info) = self.roots.get_mut(&root) else {
            return VoteOutcome::default();
        };
        let republish = info
            .election
            .should_republish(ledger.weight(txn, &vote.account));
        info.election.vote(vote);
        let confirmation = info.election.confirm_if_quorum(ledger, txn);
        VoteOutcome {
            routed: true,
            republish,
            confirmation,
        }
    }

    /// Feed an externally-generated vote (this node's own representatives)
    /// into the election for its root, without rebroadcast gating.
    pub fn vote_local(&mut self, vote: &Vote) {
        if let Some(info) = self.roots.get_mut(&vote.block.root()) {
            info.election.votes.vote(vote);
        }
    }

    /// One pass of the announcement loop.
    pub fn announce_tick(&mut self, ledger: &Ledger, txn: &StoreInner) -> AnnounceOutcome {
        let mut outcome = AnnounceOutcome::default();
        let mut retired = Vec::new();
        let mut announced = 0usize;
        for (root, info) in self.roots.iter_mut() {
            if announced < ANNOUNCEMENTS_PER_INTERVAL {
                announced += 1;
                outcome.broadcasts.push(info.election.last_winner.clone());
                if info.announcements >= CONTIGIOUS_ANNOUNCEMENTS - 1 {
                    // Reached the confirmation interval for forks.
                    if let Some(confirmation) = info.election.confirm_cutoff(ledger, txn) {
                        outcome.confirmations.push(confirmation);
                    }
                    retired.push(*root);
                } else {
                    info.announcements += 1;
                    // A full interval with nobody voting means we can't see
                    // the representatives.
                    if info.announcements > 1 && info.election.votes.voter_count() == 0 {
                        outcome.bootstrap_needed = true;
                    }
                }
            } else {
                info.announcements = 0;
            }
        }
        for root in retired {
            self.roots.remove(&root);
        }
        outcome
    }

    /// Drop every election.
    pub fn stop(&mut self) {
        self.roots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::generate_keypair;
    use raze_ledger::{Genesis, SendBlock, Store};
    use raze_types::{Account, Amount};

    struct Fixture {
        store: Store,
        ledger: Ledger,
        genesis: Genesis,
    }

    fn fixture() -> Fixture {
        let store = Store::new();
        let ledger = Ledger::new(Amount::MAX, Amount::ZERO);
        let genesis = Genesis::for_seed(&[0x22; 32]);
        {
            let mut txn = store.write();
            genesis.initialize(&mut txn);
        }
        Fixture { store, ledger, genesis }
    }

    fn block(f: &Fixture, amount: u128) -> Block {
        let kp = generate_keypair();
        Block::Send(SendBlock::new(
            f.genesis.block.hash(),
            Account::new(kp.public.0),
            Amount::new(amount),
            f.genesis.private(),
            0,
        ))
    }

    #[test]
    fn one_election_per_root() {
        let f = fixture();
        let mut active = ActiveTransactions::new();
        let b1 = block(&f, 1);
        let b2 = block(&f, 2);
        assert!(!active.start(&b1));
        // b2 shares the root; the existing election stands.
        assert!(active.start(&b2));
        assert_eq!(active.len(), 1);
        assert!(active.active(&b1.root()));
    }

    #[test]
    fn vote_without_election_is_unrouted() {
        let f = fixture();
        let mut active = ActiveTransactions::new();
        let b1 = block(&f, 1);
        let vote = Vote::new(f.genesis.account, f.genesis.private(), 1, b1);
        let txn = f.store.read();
        let outcome = active.vote(&f.ledger, &txn, &vote);
        assert!(!outcome.routed);
        assert!(outcome.confirmation.is_none());
    }

    #[test]
    fn quorum_vote_confirms_election() {
        let f = fixture();
        let mut active = ActiveTransactions::new();
        let b1 = block(&f, 1);
        active.start(&b1);

        let vote = Vote::new(f.genesis.account, f.genesis.private(), 1, b1.clone());
        let txn = f.store.read();
        let outcome = active.vote(&f.ledger, &txn, &vote);
        assert!(outcome.routed);
        let confirmation = outcome.confirmation.unwrap();
        assert_eq!(confirmation.winner.hash(), b1.hash());
    }

    #[test]
    fn announce_tick_broadcasts_and_counts() {
        let f = fixture();
        let mut active = ActiveTransactions::new();
        let b1 = block(&f, 1);
        active.start(&b1);

        let txn = f.store.read();
        let outcome = active.announce_tick(&f.ledger, &txn);
        assert_eq!(outcome.broadcasts.len(), 1);
        assert_eq!(outcome.broadcasts[0].hash(), b1.hash());
        assert!(outcome.confirmations.is_empty());
        assert!(!outcome.bootstrap_needed);
    }

    #[test]
    fn unvoted_root_triggers_bootstrap_after_second_interval() {
        let f = fixture();
        let mut active = ActiveTransactions::new();
        active.start(&block(&f, 1));

        let txn = f.store.read();
        assert!(!active.announce_tick(&f.ledger, &txn).bootstrap_needed);
        assert!(active.announce_tick(&f.ledger, &txn).bootstrap_needed);
    }

    #[test]
    fn cutoff_retires_election_after_four_intervals() {
        let f = fixture();
        let mut active = ActiveTransactions::new();
        active.start(&block(&f, 1));

        let txn = f.store.read();
        for _ in 0..3 {
            let outcome = active.announce_tick(&f.ledger, &txn);
            assert!(outcome.confirmations.is_empty());
        }
        let outcome = active.announce_tick(&f.ledger, &txn);
        assert_eq!(outcome.confirmations.len(), 1);
        assert!(active.is_empty());
    }

    #[test]
    fn roots_past_the_budget_reset_announcements() {
        let f = fixture();
        let mut active = ActiveTransactions::new();
        // Different roots need distinct previous hashes; chain off distinct
        // fork blocks to fabricate 21 roots.
        let mut roots = Vec::new();
        for _ in 0..21 {
            let kp = generate_keypair();
            let block = Block::Send(SendBlock::new(
                Block::Send(SendBlock::new(
                    f.genesis.block.hash(),
                    Account::new(kp.public.0),
                    Amount::new(1),
                    f.genesis.private(),
                    0,
                ))
                .hash(),
                Account::new(kp.public.0),
                Amount::new(1),
                f.genesis.private(),
                0,
            ));
            roots.push(block.root());
            active.start(&block);
        }
        assert_eq!(active.len(), 21);

        let txn = f.store.read();
        let outcome = active.announce_tick(&f.ledger, &txn);
        // Budget is 20 per interval; the 21st waits its turn.
        assert_eq!(outcome.broadcasts.len(), 20);
    }

    #[test]
    fn stop_clears_everything() {
        let f = fixture();
        let mut active = ActiveTransactions::new();
        active.start(&block(&f, 1));
        active.stop();
        assert!(active.is_empty());
    }
}
