//! Outstanding representative probes.
//!
//! The crawler periodically sends `confirm_req` for a known block to peers
//! and remembers the block hash for a few seconds. A vote coming back for a
//! remembered hash proves the sender is a representative; the peer table
//! records its weight.

use raze_types::BlockHash;
use std::collections::HashSet;
use std::sync::Mutex;

/// Hashes with probes currently in flight.
#[derive(Default)]
pub struct RepCrawler {
    active: Mutex<HashSet<BlockHash>>,
}

impl RepCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hash: BlockHash) {
        self.lock().insert(hash);
    }

    pub fn remove(&self, hash: &BlockHash) {
        self.lock().remove(hash);
    }

    pub fn exists(&self, hash: &BlockHash) -> bool {
        self.lock().contains(hash)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<BlockHash>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_exists_remove() {
        let crawler = RepCrawler::new();
        let hash = BlockHash::new([1u8; 32]);
        assert!(!crawler.exists(&hash));
        crawler.add(hash);
        assert!(crawler.exists(&hash));
        crawler.remove(&hash);
        assert!(!crawler.exists(&hash));
    }

    #[test]
    fn remove_unknown_is_harmless() {
        let crawler = RepCrawler::new();
        crawler.remove(&BlockHash::new([2u8; 32]));
    }
}
