//! The block processing pipeline.
//!
//! One dedicated thread owns write access to the ledger. Producers append
//! `(block, force)` items under a mutex; the thread swaps the whole queue
//! out and drains it inside a single write transaction, bounded by a
//! timeout so readers get a turn. Blocks stashed as unchecked are re-queued
//! at the front the moment their dependency lands, so dependent chains
//! settle in one transaction.

use raze_consensus::{BlockArrival, GapCache};
use raze_ledger::{Block, Ledger, ProcessResult, ProcessReturn, Store};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::bootstrap::BootstrapInitiator;

/// How long one drain may hold the write transaction.
const TRANSACTION_TIMEOUT: Duration = Duration::from_millis(500);

/// A queued block. `force` grants permission to roll back a conflicting
/// successor; only elections issue it.
#[derive(Clone, Debug)]
pub struct BlockProcessorItem {
    pub block: Block,
    pub force: bool,
}

/// Everything the processing loop needs besides the queue itself.
pub struct ProcessorContext {
    pub store: Arc<Store>,
    pub ledger: Arc<Ledger>,
    pub block_arrival: Arc<BlockArrival>,
    pub gap_cache: Arc<Mutex<GapCache>>,
    pub bootstrap: Arc<dyn BootstrapInitiator>,
    /// Fired outside the write transaction for every applied block.
    pub progress_observer: Box<dyn Fn(&Block, &ProcessReturn) + Send + Sync>,
}

#[derive(Default)]
struct State {
    queue: VecDeque<BlockProcessorItem>,
    stopped: bool,
    idle: bool,
}

/// The serialized single-writer queue.
pub struct BlockProcessor {
    state: Mutex<State>,
    condition: Condvar,
}

impl Default for BlockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockProcessor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                idle: true,
                ..State::default()
            }),
            condition: Condvar::new(),
        }
    }

    /// Queue a block for processing.
    pub fn add(&self, block: Block, force: bool) {
        let mut state = self.lock();
        state.queue.push_back(BlockProcessorItem { block, force });
        self.condition.notify_all();
    }

    /// Idempotent: wakes the thread so it can observe the stop flag.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        self.condition.notify_all();
    }

    /// Block until the queue is drained and the thread is idle.
    pub fn flush(&self) {
        let mut state = self.lock();
        while !state.stopped && (!state.queue.is_empty() || !state.idle) {
            state = self
                .condition
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// The processing thread body; returns when stopped.
    pub fn run(&self, ctx: &ProcessorContext) {
        let mut state = self.lock();
        while !state.stopped {
            if !state.queue.is_empty() {
                state.idle = false;
                let batch = std::mem::take(&mut state.queue);
                drop(state);
                self.process_batch(batch, ctx);
                // Let readers take the transaction between batches.
                std::thread::yield_now();
                state = self.lock();
            } else {
                state.idle = true;
                self.condition.notify_all();
                state = self
                    .condition
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
                state.idle = false;
            }
        }
    }

    /// Drain `batch`, re-acquiring the write transaction whenever the drain
    /// exceeds the transaction timeout.
    pub fn process_batch(&self, mut batch: VecDeque<BlockProcessorItem>, ctx: &ProcessorContext) {
        while !batch.is_empty() {
            let mut progressed: Vec<(Block, ProcessReturn)> = Vec::new();
            {
                let mut txn = ctx.store.write();
                let cutoff = Instant::now() + TRANSACTION_TIMEOUT;
                while let Some(item) = batch.pop_front() {
                    if item.force {
                        if let Some(successor) = ctx.ledger.successor(&txn, item.block.root()) {
                            if successor.hash() != item.block.hash() {
                                info!(
                                    rolling_back = %successor.hash(),
                                    replacing_with = %item.block.hash(),
                                    "election decided against our chain"
                                );
                                if let Err(error) =
                                    ctx.ledger.rollback(&mut txn, successor.hash())
                                {
                                    warn!(%error, "rollback failed");
                                }
                            }
                        }
                    }
                    let hash = item.block.hash();
                    let result = self.process_one(&mut txn, &item.block, ctx);
                    match result.code {
                        ProcessResult::Progress | ProcessResult::Old => {
                            if result.code == ProcessResult::Progress {
                                progressed.push((item.block.clone(), result));
                            }
                            // Replay anything stashed against this hash, at
                            // the front, so chains settle in one pass. Runs
                            // for Old too: a duplicate can still unblock
                            // dependents stashed before the first copy landed.
                            for dependent in txn.unchecked_take(&hash) {
                                batch.push_front(BlockProcessorItem {
                                    block: dependent,
                                    force: false,
                                });
                            }
                            ctx.gap_cache
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .erase(&hash);
                        }
                        _ => {}
                    }
                    if Instant::now() >= cutoff {
                        break;
                    }
                }
            }
            for (block, result) in progressed {
                (ctx.progress_observer)(&block, &result);
            }
        }
    }

    fn process_one(
        &self,
        txn: &mut raze_ledger::StoreInner,
        block: &Block,
        ctx: &ProcessorContext,
    ) -> ProcessReturn {
        let result = ctx.ledger.process(txn, block);
        let hash = block.hash();
        match result.code {
            ProcessResult::Progress => {
                debug!(block = %hash, "processed");
            }
            ProcessResult::GapPrevious => {
                debug!(block = %hash, "gap previous");
                txn.unchecked_put(block.previous(), block.clone());
                ctx.gap_cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .add(block);
            }
            ProcessResult::GapSource => {
                debug!(block = %hash, "gap source");
                if let Some(source) = block.source() {
                    txn.unchecked_put(source, block.clone());
                }
                ctx.gap_cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .add(block);
            }
            ProcessResult::Old => {
                self.replace_if_heavier(txn, block, ctx);
                debug!(block = %hash, "old");
            }
            ProcessResult::BadSignature => {
                debug!(block = %hash, "bad signature");
            }
            ProcessResult::NegativeSpend => {
                debug!(block = %hash, "negative spend");
            }
            ProcessResult::Unreceivable => {
                debug!(block = %hash, "unreceivable");
            }
            ProcessResult::NotReceiveFromSend => {
                debug!(block = %hash, "not receive from send");
            }
            ProcessResult::Fork => {
                // Forks that arrived over UDP resolve by election; only
                // bootstrap-discovered forks go to the synchronizer.
                if !ctx.block_arrival.recent(&hash) {
                    ctx.bootstrap.process_fork(txn, block);
                }
                debug!(block = %hash, root = %block.root(), "fork");
            }
            ProcessResult::AccountMismatch => {
                debug!(block = %hash, "account mismatch");
            }
            ProcessResult::OpenedBurnAccount => {
                warn!(block = %hash, "rejecting open block for the burn account");
            }
        }
        result
    }

    /// A duplicate with a heavier proof-of-work replaces the stored copy
    /// (same hash, same linkage) provided its signature still verifies
    /// against the chain owner.
    fn replace_if_heavier(
        &self,
        txn: &mut raze_ledger::StoreInner,
        block: &Block,
        _ctx: &ProcessorContext,
    ) {
        let hash = block.hash();
        let Some(existing) = txn.block_get(&hash).cloned() else {
            // Could have been rolled back in this very batch.
            return;
        };
        let root = block.root();
        if raze_work::work_value(&root, block.work())
            <= raze_work::work_value(&root, existing.work())
        {
            return;
        }
        let Some(account) = txn.block_account(&hash) else {
            return;
        };
        let verifies = raze_crypto::verify_digest(
            hash.as_bytes(),
            block.signature(),
            &raze_types::PublicKey(*account.as_bytes()),
        );
        if verifies {
            info!(block = %hash, "replacing block with one that has higher work value");
            txn.block_replace(hash, block.clone());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::generate_keypair;
    use raze_ledger::{Genesis, SendBlock};
    use raze_types::{Account, Amount, BlockHash};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::bootstrap::NullBootstrap;

    struct Fixture {
        processor: BlockProcessor,
        ctx: ProcessorContext,
        genesis: Genesis,
        progressed: Arc<Mutex<Vec<BlockHash>>>,
        bootstrap: Arc<NullBootstrap>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::new());
        let ledger = Arc::new(Ledger::new(Amount::MAX, Amount::ZERO));
        let genesis = Genesis::for_seed(&[0x66; 32]);
        {
            let mut txn = store.write();
            genesis.initialize(&mut txn);
        }
        let progressed = Arc::new(Mutex::new(Vec::new()));
        let observer_list = progressed.clone();
        let bootstrap = Arc::new(NullBootstrap::new());
        let ctx = ProcessorContext {
            store,
            ledger,
            block_arrival: Arc::new(BlockArrival::new()),
            gap_cache: Arc::new(Mutex::new(GapCache::new(1))),
            bootstrap: bootstrap.clone(),
            progress_observer: Box::new(move |block, _result| {
                observer_list.lock().unwrap().push(block.hash());
            }),
        };
        Fixture {
            processor: BlockProcessor::new(),
            ctx,
            genesis,
            progressed,
            bootstrap,
        }
    }

    fn send(f: &Fixture, previous: BlockHash, balance: u128) -> Block {
        let kp = generate_keypair();
        Block::Send(SendBlock::new(
            previous,
            Account::new(kp.public.0),
            Amount::new(balance),
            f.genesis.private(),
            0,
        ))
    }

    fn drain(f: &Fixture, items: Vec<BlockProcessorItem>) {
        f.processor.process_batch(items.into(), &f.ctx);
    }

    #[test]
    fn progress_notifies_observer() {
        let f = fixture();
        let block = send(&f, f.genesis.block.hash(), 100);
        drain(
            &f,
            vec![BlockProcessorItem {
                block: block.clone(),
                force: false,
            }],
        );
        assert_eq!(*f.progressed.lock().unwrap(), vec![block.hash()]);
    }

    #[test]
    fn reverse_order_chain_settles_via_unchecked_replay() {
        let f = fixture();
        let b1 = send(&f, f.genesis.block.hash(), 300);
        let b2 = send(&f, b1.hash(), 200);
        let b3 = send(&f, b2.hash(), 100);

        // Deepest first: b3 and b2 gap, then b1 unlocks the chain.
        drain(
            &f,
            vec![
                BlockProcessorItem { block: b3.clone(), force: false },
                BlockProcessorItem { block: b2.clone(), force: false },
                BlockProcessorItem { block: b1.clone(), force: false },
            ],
        );
        let progressed = f.progressed.lock().unwrap().clone();
        assert_eq!(progressed, vec![b1.hash(), b2.hash(), b3.hash()]);
        let txn = f.ctx.store.read();
        assert!(txn.block_exists(&b3.hash()));
        assert_eq!(txn.unchecked_count(), 0);
    }

    #[test]
    fn gap_block_lands_in_unchecked_and_gap_cache() {
        let f = fixture();
        let orphan = send(&f, BlockHash::new([0xAA; 32]), 100);
        drain(
            &f,
            vec![BlockProcessorItem { block: orphan, force: false }],
        );
        let txn = f.ctx.store.read();
        assert_eq!(txn.unchecked_count(), 1);
        assert_eq!(f.ctx.gap_cache.lock().unwrap().len(), 1);
        assert!(f.progressed.lock().unwrap().is_empty());
    }

    #[test]
    fn force_item_rolls_back_sibling() {
        let f = fixture();
        let b1 = send(&f, f.genesis.block.hash(), 300);
        let b2 = send(&f, f.genesis.block.hash(), 200);

        drain(&f, vec![BlockProcessorItem { block: b1.clone(), force: false }]);
        // b2 loses as a plain item (fork), wins as a force item.
        drain(&f, vec![BlockProcessorItem { block: b2.clone(), force: false }]);
        {
            let txn = f.ctx.store.read();
            assert!(txn.block_exists(&b1.hash()));
            assert!(!txn.block_exists(&b2.hash()));
        }

        drain(&f, vec![BlockProcessorItem { block: b2.clone(), force: true }]);
        let txn = f.ctx.store.read();
        assert!(!txn.block_exists(&b1.hash()));
        assert!(txn.block_exists(&b2.hash()));
    }

    #[test]
    fn force_with_same_block_is_a_noop_rollback() {
        let f = fixture();
        let b1 = send(&f, f.genesis.block.hash(), 300);
        drain(&f, vec![BlockProcessorItem { block: b1.clone(), force: false }]);
        drain(&f, vec![BlockProcessorItem { block: b1.clone(), force: true }]);
        let txn = f.ctx.store.read();
        assert!(txn.block_exists(&b1.hash()));
    }

    #[test]
    fn old_duplicate_with_heavier_work_replaces_stored_nonce() {
        let f = fixture();
        let block = send(&f, f.genesis.block.hash(), 300);
        drain(&f, vec![BlockProcessorItem { block: block.clone(), force: false }]);

        // Same block, different nonce; pick whichever weighs more.
        let mut reworked = block.clone();
        reworked.set_work(1);
        let root = block.root();
        let (light, heavy) = if raze_work::work_value(&root, block.work())
            < raze_work::work_value(&root, reworked.work())
        {
            (block.clone(), reworked.clone())
        } else {
            (reworked.clone(), block.clone())
        };

        // Re-process the heavier duplicate over the lighter stored copy.
        {
            let mut txn = f.ctx.store.write();
            txn.block_replace(block.hash(), light);
        }
        drain(&f, vec![BlockProcessorItem { block: heavy.clone(), force: false }]);
        let txn = f.ctx.store.read();
        assert_eq!(txn.block_get(&block.hash()).unwrap().work(), heavy.work());
    }

    #[test]
    fn fork_outside_arrival_window_goes_to_bootstrap() {
        let f = fixture();
        let b1 = send(&f, f.genesis.block.hash(), 300);
        let b2 = send(&f, f.genesis.block.hash(), 200);
        drain(&f, vec![BlockProcessorItem { block: b1, force: false }]);
        drain(&f, vec![BlockProcessorItem { block: b2.clone(), force: false }]);
        assert_eq!(f.bootstrap.forks(), vec![b2.hash()]);
    }

    #[test]
    fn fork_from_recent_arrival_stays_with_elections() {
        let f = fixture();
        let b1 = send(&f, f.genesis.block.hash(), 300);
        let b2 = send(&f, f.genesis.block.hash(), 200);
        drain(&f, vec![BlockProcessorItem { block: b1, force: false }]);
        f.ctx.block_arrival.add(b2.hash());
        drain(&f, vec![BlockProcessorItem { block: b2, force: false }]);
        assert!(f.bootstrap.forks().is_empty());
    }

    #[test]
    fn run_loop_drains_and_stops() {
        let f = fixture();
        let block = send(&f, f.genesis.block.hash(), 100);
        let processor = Arc::new(BlockProcessor::new());
        let ctx = f.ctx;
        let runner = processor.clone();
        let observer_count = Arc::new(AtomicUsize::new(0));

        let thread = std::thread::spawn({
            let ctx = ProcessorContext {
                store: ctx.store.clone(),
                ledger: ctx.ledger.clone(),
                block_arrival: ctx.block_arrival.clone(),
                gap_cache: ctx.gap_cache.clone(),
                bootstrap: ctx.bootstrap.clone(),
                progress_observer: {
                    let observer_count = observer_count.clone();
                    Box::new(move |_, _| {
                        observer_count.fetch_add(1, Ordering::SeqCst);
                    })
                },
            };
            move || runner.run(&ctx)
        });

        processor.add(block, false);
        processor.flush();
        assert_eq!(observer_count.load(Ordering::SeqCst), 1);
        processor.stop();
        thread.join().unwrap();
    }
}
