//! The bootstrap boundary.
//!
//! Bulk synchronization runs over TCP outside the node core; the core only
//! decides *when* to synchronize and which forks to hand over. This trait is
//! that boundary. [`NullBootstrap`] records invocations so the rest of the
//! node (and its tests) can observe trigger conditions without a TCP stack.

use raze_ledger::{Block, StoreInner};
use raze_types::BlockHash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Interface the core drives; the real implementation syncs over TCP.
pub trait BootstrapInitiator: Send + Sync {
    /// Begin (or re-trigger) a synchronization round.
    fn bootstrap(&self);

    fn in_progress(&self) -> bool;

    /// Inform the synchronizer of a fork discovered outside the UDP path.
    fn process_fork(&self, txn: &StoreInner, block: &Block);

    /// Idempotent shutdown.
    fn stop(&self);
}

/// Records every trigger; the default when no TCP synchronizer is wired.
#[derive(Default)]
pub struct NullBootstrap {
    bootstrap_count: AtomicU64,
    in_progress: AtomicBool,
    forks: Mutex<Vec<BlockHash>>,
}

impl NullBootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bootstrap_count(&self) -> u64 {
        self.bootstrap_count.load(Ordering::SeqCst)
    }

    pub fn forks(&self) -> Vec<BlockHash> {
        self.forks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_in_progress(&self, value: bool) {
        self.in_progress.store(value, Ordering::SeqCst);
    }
}

impl BootstrapInitiator for NullBootstrap {
    fn bootstrap(&self) {
        self.bootstrap_count.fetch_add(1, Ordering::SeqCst);
    }

    fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn process_fork(&self, _txn: &StoreInner, block: &Block) {
        self.forks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(block.hash());
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_bootstrap_calls() {
        let bootstrap = NullBootstrap::new();
        assert_eq!(bootstrap.bootstrap_count(), 0);
        bootstrap.bootstrap();
        bootstrap.bootstrap();
        assert_eq!(bootstrap.bootstrap_count(), 2);
    }

    #[test]
    fn in_progress_flag() {
        let bootstrap = NullBootstrap::new();
        assert!(!bootstrap.in_progress());
        bootstrap.set_in_progress(true);
        assert!(bootstrap.in_progress());
    }
}
