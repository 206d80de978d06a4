//! Ed25519 signing over 32-byte Blake2b digests.
//!
//! Nothing in the protocol signs free-form messages: every signature covers
//! either a block hash or a vote digest, so the API takes the digest
//! directly and the type system rules out signing unhashed payloads.
//!
//! Verification is strict per RFC 8032: non-canonical point and scalar
//! encodings are rejected, as are small-order ("weak") public keys. Whether
//! a signature verifies feeds the per-account vote replay table, so every
//! node must reach the same verdict on the same bytes; the malleable
//! verification mode would let a relay mutate a signature without changing
//! its validity.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use raze_types::{PrivateKey, PublicKey, Signature};

/// Sign a 32-byte digest.
pub fn sign_digest(digest: &[u8; 32], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    Signature(signing_key.sign(digest).to_bytes())
}

/// Strictly verify a signature over a 32-byte digest.
///
/// The account field of a block or vote is attacker-controlled, so bytes
/// that don't decode to a curve point, or decode to a small-order point,
/// simply verify nothing.
pub fn verify_digest(digest: &[u8; 32], signature: &Signature, public_key: &PublicKey) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(&public_key.0) {
        Ok(key) if !key.is_weak() => key,
        _ => return false,
    };
    let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify_strict(digest, &signature).is_ok()
}
