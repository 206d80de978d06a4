//! Anti-spam proof-of-work.
//!
//! Not mining — a small computational cost attached to every block so that
//! flooding the network is expensive while a single legitimate block costs a
//! fraction of a second. A nonce is valid for a root when the 64-bit Blake2b
//! digest of `nonce ‖ root` meets the network threshold.

pub mod distributed;
pub mod pool;

pub use distributed::{distributed_work, WorkPeer};
pub use pool::WorkPool;

use raze_types::BlockHash;

/// The work value of a nonce against a root.
pub fn work_value(root: &BlockHash, nonce: u64) -> u64 {
    raze_crypto::blake2b_64(&[&nonce.to_le_bytes(), root.as_bytes()])
}

/// Whether a nonce meets the threshold for a root.
pub fn work_validate(root: &BlockHash, nonce: u64, threshold: u64) -> bool {
    work_value(root, nonce) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_types::NetworkId;

    #[test]
    fn work_value_is_deterministic() {
        let root = BlockHash::new([7u8; 32]);
        assert_eq!(work_value(&root, 12345), work_value(&root, 12345));
        assert_ne!(work_value(&root, 12345), work_value(&root, 12346));
    }

    #[test]
    fn zero_threshold_accepts_anything() {
        let root = BlockHash::new([1u8; 32]);
        assert!(work_validate(&root, 0, 0));
    }

    #[test]
    fn max_threshold_rejects() {
        let root = BlockHash::new([1u8; 32]);
        assert!(!work_validate(&root, 42, u64::MAX));
    }

    #[test]
    fn generated_work_validates_on_test_network() {
        let pool = WorkPool::new(1);
        let root = BlockHash::new([9u8; 32]);
        let threshold = NetworkId::Test.work_threshold();
        let nonce = pool.generate_blocking(root, threshold).unwrap();
        assert!(work_validate(&root, nonce, threshold));
        pool.stop();
    }
}
