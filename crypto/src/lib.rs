//! Cryptographic primitives for the raze protocol.
//!
//! Blake2b digests for block hashes and proof-of-work values, Ed25519 for
//! block and vote signatures. Everything here is a pure function; key
//! generation is the only entry point that touches an RNG.

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi, blake2b_64};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_digest, verify_digest};
