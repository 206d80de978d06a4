//! Genesis block and first-boot store initialization.
//!
//! Each network pins a genesis key; the genesis open block claims the entire
//! supply for that account. The open's source is the genesis account itself
//! since there is no originating send.

use raze_crypto::keypair_from_seed;
use raze_types::{Account, Amount, KeyPair, NetworkId, PrivateKey, PublicKey};

use crate::block::{Block, OpenBlock};
use crate::store::{AccountInfo, StoreInner};

/// The genesis identity and block for one network.
pub struct Genesis {
    pub account: Account,
    pub block: Block,
    key: KeyPair,
}

impl Genesis {
    /// Raw units granted to the genesis account.
    pub const AMOUNT: Amount = Amount::MAX;

    pub fn for_network(network: NetworkId) -> Self {
        let seed: [u8; 32] = match network {
            NetworkId::Live => *b"raze genesis seed live 000000001",
            NetworkId::Beta => *b"raze genesis seed beta 000000001",
            NetworkId::Test => *b"raze genesis seed test 000000001",
        };
        Self::for_seed(&seed)
    }

    /// Build a genesis from an explicit seed. Tests use throwaway seeds so
    /// fixtures control the full supply.
    pub fn for_seed(seed: &[u8; 32]) -> Self {
        let key = keypair_from_seed(seed);
        let account = Account::new(key.public.0);
        let block = Block::Open(OpenBlock::new(
            account.into_root(),
            account,
            account,
            &key.private,
            0,
        ));
        Self {
            account,
            block,
            key,
        }
    }

    /// Write the genesis entry into an empty store.
    pub fn initialize(&self, txn: &mut StoreInner) {
        let hash = self.block.hash();
        txn.block_put(hash, self.block.clone(), self.account, Self::AMOUNT);
        txn.account_put(
            self.account,
            AccountInfo {
                head: hash,
                representative: self.account,
                balance: Self::AMOUNT,
                open_block: hash,
            },
        );
        txn.representation_add(self.account, Self::AMOUNT);
    }

    pub fn private(&self) -> &PrivateKey {
        &self.key.private
    }

    pub fn public(&self) -> &PublicKey {
        &self.key.public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::store::Store;

    #[test]
    fn genesis_is_deterministic_per_network() {
        let a = Genesis::for_network(NetworkId::Test);
        let b = Genesis::for_network(NetworkId::Test);
        assert_eq!(a.block.hash(), b.block.hash());
        assert_ne!(
            a.block.hash(),
            Genesis::for_network(NetworkId::Live).block.hash()
        );
    }

    #[test]
    fn initialize_grants_full_supply() {
        let genesis = Genesis::for_seed(&[1u8; 32]);
        let store = Store::new();
        let mut txn = store.write();
        assert!(txn.accounts_empty());

        genesis.initialize(&mut txn);
        let ledger = Ledger::new(Genesis::AMOUNT, Amount::ZERO);
        assert_eq!(ledger.account_balance(&txn, &genesis.account), Genesis::AMOUNT);
        assert_eq!(ledger.weight(&txn, &genesis.account), Genesis::AMOUNT);
        assert_eq!(ledger.latest(&txn, &genesis.account), Some(genesis.block.hash()));
    }

    #[test]
    fn genesis_signature_is_valid() {
        let genesis = Genesis::for_seed(&[2u8; 32]);
        assert!(raze_crypto::verify_digest(
            genesis.block.hash().as_bytes(),
            genesis.block.signature(),
            genesis.public(),
        ));
    }
}
