//! The recently-arrived window.
//!
//! Blocks that came in over the network in the last minute are treated
//! differently from bootstrap traffic: they seed elections, fire the
//! confirmation callback, and their forks are left for voting rather than
//! handed to the bootstrap initiator.

use raze_types::BlockHash;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Arrivals {
    order: VecDeque<(Instant, BlockHash)>,
    hashes: HashSet<BlockHash>,
}

/// Sliding one-minute window of network-arrived block hashes.
#[derive(Default)]
pub struct BlockArrival {
    inner: Mutex<Arrivals>,
}

impl BlockArrival {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hash: BlockHash) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.push_back((Instant::now(), hash));
        inner.hashes.insert(hash);
    }

    /// Whether `hash` arrived over the network within the window.
    pub fn recent(&self, hash: &BlockHash) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = Instant::now() - WINDOW;
        while let Some((arrived, old)) = inner.order.front().copied() {
            if arrived >= cutoff {
                break;
            }
            inner.order.pop_front();
            inner.hashes.remove(&old);
        }
        inner.hashes.contains(hash)
    }
}
