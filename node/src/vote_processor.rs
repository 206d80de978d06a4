//! Vote validation front-end.
//!
//! Classifies incoming votes against the ledger's replay state and logs the
//! outcome. Routing to elections, the gap cache, and representative
//! discovery happens in the node's vote observers.

use raze_ledger::{Ledger, Store, Vote, VoteCode, VoteResult};
use std::sync::Arc;
use tracing::debug;

pub struct VoteProcessor {
    store: Arc<Store>,
    ledger: Arc<Ledger>,
}

impl VoteProcessor {
    pub fn new(store: Arc<Store>, ledger: Arc<Ledger>) -> Self {
        Self { store, ledger }
    }

    /// Validate a vote: signature first, then sequence replay.
    pub fn vote(&self, vote: &Vote) -> VoteResult {
        let result = {
            let mut txn = self.store.write();
            self.ledger.vote_validate(&mut txn, vote)
        };
        let status = match result.code {
            VoteCode::Invalid => "invalid",
            VoteCode::Replay => "replay",
            VoteCode::Vote | VoteCode::Vote2 => "vote",
        };
        debug!(
            account = %vote.account,
            sequence = vote.sequence,
            block = %vote.block.hash(),
            status,
            "vote processed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::generate_keypair;
    use raze_ledger::{Block, Genesis, SendBlock};
    use raze_types::{Account, Amount};

    fn setup() -> (VoteProcessor, Genesis, Block) {
        let store = Arc::new(Store::new());
        let ledger = Arc::new(Ledger::new(Amount::MAX, Amount::ZERO));
        let genesis = Genesis::for_seed(&[0x55; 32]);
        {
            let mut txn = store.write();
            genesis.initialize(&mut txn);
        }
        let dest = generate_keypair();
        let block = Block::Send(SendBlock::new(
            genesis.block.hash(),
            Account::new(dest.public.0),
            Amount::new(5),
            genesis.private(),
            0,
        ));
        (VoteProcessor::new(store, ledger), genesis, block)
    }

    #[test]
    fn valid_vote_then_replay() {
        let (processor, genesis, block) = setup();
        let vote = Vote::new(genesis.account, genesis.private(), 1, block.clone());
        assert_eq!(processor.vote(&vote).code, VoteCode::Vote2);

        let result = processor.vote(&vote);
        assert_eq!(result.code, VoteCode::Replay);
        assert_eq!(result.vote.sequence, 1);
    }

    #[test]
    fn forged_vote_is_invalid() {
        let (processor, genesis, block) = setup();
        let mallory = generate_keypair();
        let vote = Vote::new(genesis.account, &mallory.private, 1, block);
        assert_eq!(processor.vote(&vote).code, VoteCode::Invalid);
    }
}
