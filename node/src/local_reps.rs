//! Representative keys held by this node.
//!
//! Wallet storage and key derivation live outside the core; what the core
//! needs is the set of representative keys it votes with. Seeds come from
//! the node config.

use raze_crypto::keypair_from_seed;
use raze_types::{Account, PrivateKey, PublicKey};

use crate::error::NodeError;

/// One representative identity this node can sign votes with.
pub struct LocalRep {
    pub account: Account,
    pub public: PublicKey,
    pub private: PrivateKey,
}

/// All representative identities from the config.
#[derive(Default)]
pub struct LocalRepSet {
    reps: Vec<LocalRep>,
}

impl LocalRepSet {
    /// Parse 64-character hex seeds into key pairs.
    pub fn from_seeds(seeds: &[String]) -> Result<Self, NodeError> {
        let mut reps = Vec::with_capacity(seeds.len());
        for seed_hex in seeds {
            let hash: raze_types::BlockHash = seed_hex
                .parse()
                .map_err(|_| NodeError::InvalidSeed(seed_hex.clone()))?;
            let key = keypair_from_seed(hash.as_bytes());
            reps.push(LocalRep {
                account: Account::new(key.public.0),
                public: key.public,
                private: key.private,
            });
        }
        Ok(Self { reps })
    }

    pub fn is_empty(&self) -> bool {
        self.reps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalRep> {
        self.reps.iter()
    }
}
