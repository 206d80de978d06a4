//! The per-root election state machine.

use raze_ledger::{Block, Ledger, StoreInner, Vote, Votes};
use raze_types::{Amount, MRAZE_RATIO};
use std::time::{Duration, Instant};
use tracing::info;

/// Weight below which a vote is not worth rebroadcasting; keeps dust
/// accounts from amplifying traffic.
const REBROADCAST_WEIGHT_MINIMUM: u128 = 256 * MRAZE_RATIO;

/// Minimum quiet time between rebroadcasts of votes for one root.
const REBROADCAST_SPACING: Duration = Duration::from_secs(1);

/// The decision an election reached.
#[derive(Clone, Debug)]
pub struct Confirmation {
    /// The confirmed block.
    pub winner: Block,
    /// Whether the tally carried more than `supply / 16`; below that the
    /// node refuses to switch winners (it is probably disconnected).
    pub exceeded_min_threshold: bool,
    /// When the tally displaced the previous winner: the block to submit to
    /// the processor with rollback permission. The election never touches
    /// the ledger itself.
    pub force: Option<Block>,
}

/// Vote collection for a single root.
pub struct Election {
    pub votes: Votes,
    pub last_winner: Block,
    last_vote: Instant,
    confirmed: bool,
}

impl Election {
    /// Create an election seeded with the block that revealed the conflict.
    pub fn new(block: &Block) -> Self {
        Self {
            votes: Votes::new(block),
            last_winner: block.clone(),
            last_vote: Instant::now(),
            confirmed: false,
        }
    }

    /// Unanimous-style majority: above this the election confirms outright.
    pub fn quorum_threshold(ledger: &Ledger, txn: &StoreInner) -> Amount {
        Amount::new(ledger.supply(txn).raw() / 2)
    }

    /// Below this the tally is too weak to justify replacing our block.
    pub fn minimum_threshold(ledger: &Ledger, txn: &StoreInner) -> Amount {
        Amount::new(ledger.supply(txn).raw() / 16)
    }

    /// Whether an incoming vote should be rebroadcast: votes for this root
    /// have been quiet for a second and the voter carries real weight.
    pub fn should_republish(&self, voter_weight: Amount) -> bool {
        self.last_vote.elapsed() > REBROADCAST_SPACING
            && voter_weight > Amount::new(REBROADCAST_WEIGHT_MINIMUM)
    }

    /// Fold a vote into the tally and stamp the vote clock.
    pub fn vote(&mut self, vote: &Vote) -> bool {
        self.last_vote = Instant::now();
        self.votes.vote(vote)
    }

    /// Confirm when the tally leader exceeds the quorum threshold.
    pub fn confirm_if_quorum(&mut self, ledger: &Ledger, txn: &StoreInner) -> Option<Confirmation> {
        let (weight, _) = ledger.winner(txn, &self.votes);
        if weight > Self::quorum_threshold(ledger, txn) {
            self.confirm_once(ledger, txn)
        } else {
            None
        }
    }

    /// Confirm unconditionally on the current tally (the announcement-cutoff
    /// path).
    pub fn confirm_cutoff(&mut self, ledger: &Ledger, txn: &StoreInner) -> Option<Confirmation> {
        self.confirm_once(ledger, txn)
    }

    /// One-shot: the first call decides, every later call returns `None`.
    fn confirm_once(&mut self, ledger: &Ledger, txn: &StoreInner) -> Option<Confirmation> {
        if self.confirmed {
            return None;
        }
        self.confirmed = true;
        let (weight, leader) = ledger.winner(txn, &self.votes);
        let exceeded_min_threshold = weight > Self::minimum_threshold(ledger, txn);
        let mut force = None;
        if leader.hash() != self.last_winner.hash() {
            if exceeded_min_threshold {
                force = Some(leader.clone());
                self.last_winner = leader;
            } else {
                info!(block = %self.last_winner.hash(), "retaining block");
            }
        }
        Some(Confirmation {
            winner: self.last_winner.clone(),
            exceeded_min_threshold,
            force,
        })
    }

    pub fn confirmed(&self) -> bool {
        self.confirmed
    }
}
