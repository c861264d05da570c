//! BLAKE3-based hashing and key derivation underlying the crypto adapter.
//!
//! `hash` and `derive_key` look similar but have opposite determinism
//! contracts: `hash` folds in fresh randomness on every call (it backs
//! commitments that are carried and never recomputed-and-compared), while
//! `derive_key` is a pure function of its context map (it backs session
//! keys and per-stream subkeys, which both peers must derive identically).

use strand_serial::Value;

use crate::error::{CryptoError, Result};
use crate::random::fill_random;

/// A 32-byte digest produced by [`hash`].
pub type Digest = [u8; 32];

/// Probabilistic content hash bound to a context map.
///
/// Two calls with identical `data`/`context` MAY return different digests:
/// a random 16-byte salt is mixed into the input before hashing. A digest
/// from this function is meaningful only as a value that is transmitted
/// and later compared against a remembered value — never recomputed and
/// compared for equality by a verifier, and never used as key material.
pub fn hash(data: &[u8], context: &Value) -> Result<Digest> {
    let mut salt = [0u8; 16];
    fill_random(&mut salt).map_err(|_| CryptoError::RandomFailed)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(&salt);
    hasher.update(data);
    hasher.update(&context.to_bytes());
    Ok(*hasher.finalize().as_bytes())
}

/// Deterministic key derivation: same `ikm`/`context`/`size` always yields
/// the same output. Used for session-key derivation, per-stream subkeys,
/// and key rotation.
#[must_use]
pub fn derive_key(ikm: &[u8], context: &Value, size: usize) -> Vec<u8> {
    let context_bytes = context.to_bytes();
    let keyed = blake3::hash(ikm);
    let mut hasher = blake3::Hasher::new_keyed(keyed.as_bytes());
    hasher.update(&context_bytes);

    let mut output = vec![0u8; size];
    let mut reader = hasher.finalize_xof();
    reader.fill(&mut output);
    output
}
