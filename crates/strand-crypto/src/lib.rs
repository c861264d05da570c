//! # strand-crypto
//!
//! Concrete realization of the opaque crypto adapter specified by the
//! `strand` protocol: probabilistic hashing and AEAD, deterministic key
//! derivation and rotation, per-stream crypto isolation, and a small
//! persisted encrypted-record store ("chamber").
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | AEAD | `XChaCha20-Poly1305` |
//! | Hash / KDF | BLAKE3 |
//! | Chamber key derivation | Argon2id |
//!
//! There is deliberately no Diffie-Hellman, no signature scheme, and no
//! key ratchet in this crate: the protocol authenticates peers from a
//! pre-distributed shared seed, never an online key exchange.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod adapter;
pub mod chamber;
pub mod constant_time;
pub mod error;
pub mod hash;
pub mod random;

pub use adapter::{decrypt, encrypt, rotate_key, Metadata, StreamCrypto, KEY_SIZE, NONCE_SIZE};
pub use chamber::{Chamber, Label as ChamberLabel};
pub use error::CryptoError;
pub use hash::{derive_key, hash, Digest};

/// Minimum accepted length, in bytes, of a pre-distributed shared seed.
pub const MIN_SHARED_SEED_SIZE: usize = 32;

/// Validate that a shared seed meets the minimum length requirement.
pub fn validate_shared_seed(seed: &[u8]) -> error::Result<()> {
    if seed.len() < MIN_SHARED_SEED_SIZE {
        return Err(CryptoError::BadSeed(seed.len()));
    }
    Ok(())
}
