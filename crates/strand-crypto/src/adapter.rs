//! The crypto adapter: the concrete realization of the opaque primitive.
//!
//! `encrypt`/`decrypt` are probabilistic: the same plaintext under the same
//! key produces a different ciphertext (and metadata blob) on every call,
//! since a fresh random nonce is drawn each time. `rotate_key` is
//! deterministic. Callers that need proof of key equality must decrypt a
//! value back to an expected plaintext rather than compare ciphertexts —
//! see the handshake engine in `strand-core`.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use strand_serial::Value;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::hash::derive_key;
use crate::random::fill_random;

/// Size of a session/stream key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the AEAD nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Opaque metadata blob produced by [`encrypt`] and required by [`decrypt`].
///
/// Concretely this is just the random nonce used for that call; callers
/// must not assume anything about its internal structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata(Vec<u8>);

impl Metadata {
    /// View the raw bytes of this metadata blob.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Reconstruct a metadata blob from raw bytes (e.g. after TLV decoding).
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Metadata(bytes)
    }
}

fn cipher_from_key(key: &[u8]) -> Result<XChaCha20Poly1305> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        });
    }
    Ok(XChaCha20Poly1305::new(key.into()))
}

/// Probabilistic AEAD encryption under `key`, binding `associated_data`.
///
/// Returns the ciphertext and an opaque metadata blob that must be
/// presented to [`decrypt`] along with the same associated data.
pub fn encrypt(plaintext: &[u8], key: &[u8], associated_data: &Value) -> Result<(Vec<u8>, Metadata)> {
    let cipher = cipher_from_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    fill_random(&mut nonce_bytes).map_err(|_| CryptoError::RandomFailed)?;
    let nonce = XNonce::from_slice(&nonce_bytes);

    let aad = associated_data.to_bytes();
    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: &aad })
        .map_err(|_| CryptoError::PrimitiveFailure("aead encrypt".into()))?;

    Ok((ciphertext, Metadata(nonce_bytes.to_vec())))
}

/// Decrypt `ciphertext` under `key`, verifying `associated_data` against
/// what was bound at encrypt time. Fails with [`CryptoError::DecryptFailed`]
/// if the metadata, ciphertext, or associated data do not match.
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8],
    metadata: &Metadata,
    associated_data: &Value,
) -> Result<Vec<u8>> {
    let cipher = cipher_from_key(key)?;

    if metadata.0.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidMetadata);
    }
    let nonce = XNonce::from_slice(&metadata.0);

    let aad = associated_data.to_bytes();
    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: &aad })
        .map_err(|_| CryptoError::DecryptFailed)
}

/// Deterministic key rotation: `current_key` and `rotation_nonce` always
/// produce the same `new_key`.
#[must_use]
pub fn rotate_key(current_key: &[u8], rotation_nonce: &[u8]) -> Zeroizing<Vec<u8>> {
    let context = Value::Bytes(rotation_nonce.to_vec());
    Zeroizing::new(derive_key(current_key, &context, KEY_SIZE))
}

/// A per-stream crypto context, preventing nonce/chunk-index collisions
/// between streams that share a session key.
///
/// The context derives its own subkey from the session key and
/// `stream_id` once, then uses [`encrypt`]/[`decrypt`] keyed on that
/// subkey for every chunk — so even though the top-level primitive is
/// probabilistic, no two streams ever authenticate under the same key
/// material.
pub struct StreamCrypto {
    subkey: Zeroizing<Vec<u8>>,
    stream_id: u64,
}

impl StreamCrypto {
    /// Derive a new per-stream context from the session key.
    #[must_use]
    pub fn new(session_key: &[u8], stream_id: u64) -> Self {
        let context = Value::Map(
            [
                ("purpose".to_string(), Value::Text("stream_key".into())),
                ("stream_id".to_string(), Value::U64(stream_id)),
            ]
            .into_iter()
            .collect(),
        );
        let subkey = Zeroizing::new(derive_key(session_key, &context, KEY_SIZE));
        Self { subkey, stream_id }
    }

    /// Encrypt one chunk of stream payload, binding `chunk_index` as
    /// associated data so that chunks cannot be reordered or replayed
    /// across indices. Returns a single opaque blob (nonce-prefixed
    /// ciphertext) suitable for embedding directly in a frame payload.
    pub fn encrypt_chunk(&self, plaintext: &[u8], chunk_index: u64) -> Result<Vec<u8>> {
        let ad = chunk_context(self.stream_id, chunk_index);
        let (ciphertext, metadata) = encrypt(plaintext, &self.subkey, &ad)?;
        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(metadata.as_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt one chunk previously produced by [`Self::encrypt_chunk`].
    pub fn decrypt_chunk(&self, data: &[u8], chunk_index: u64) -> Result<Vec<u8>> {
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::InvalidMetadata);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        let metadata = Metadata::from_bytes(nonce.to_vec());
        let ad = chunk_context(self.stream_id, chunk_index);
        decrypt(ciphertext, &self.subkey, &metadata, &ad)
    }
}

fn chunk_context(stream_id: u64, chunk_index: u64) -> Value {
    Value::Map(
        [
            ("stream_id".to_string(), Value::U64(stream_id)),
            ("chunk_index".to_string(), Value::U64(chunk_index)),
        ]
        .into_iter()
        .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_serial::map_from_pairs;

    fn test_key() -> [u8; KEY_SIZE] {
        [0x42; KEY_SIZE]
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let key = test_key();
        let ad = map_from_pairs([("purpose", Value::Text("test".into()))]);
        let (ct, meta) = encrypt(b"hello world", &key, &ad).unwrap();
        let pt = decrypt(&ct, &key, &meta, &ad).unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn encrypt_is_probabilistic() {
        let key = test_key();
        let ad = map_from_pairs([("purpose", Value::Text("test".into()))]);
        let (ct1, meta1) = encrypt(b"same plaintext", &key, &ad).unwrap();
        let (ct2, meta2) = encrypt(b"same plaintext", &key, &ad).unwrap();
        assert_ne!(ct1, ct2, "ciphertext must differ across calls");
        assert_ne!(meta1, meta2, "nonce metadata must differ across calls");
    }

    #[test]
    fn decrypt_fails_on_associated_data_mismatch() {
        let key = test_key();
        let ad = map_from_pairs([("stream_id", Value::U64(1))]);
        let (ct, meta) = encrypt(b"payload", &key, &ad).unwrap();
        let wrong_ad = map_from_pairs([("stream_id", Value::U64(2))]);
        assert!(matches!(
            decrypt(&ct, &key, &meta, &wrong_ad),
            Err(CryptoError::DecryptFailed)
        ));
    }

    #[test]
    fn decrypt_fails_on_tampered_ciphertext() {
        let key = test_key();
        let ad = map_from_pairs([("purpose", Value::Text("test".into()))]);
        let (mut ct, meta) = encrypt(b"payload", &key, &ad).unwrap();
        ct[0] ^= 0xff;
        assert!(matches!(
            decrypt(&ct, &key, &meta, &ad),
            Err(CryptoError::DecryptFailed)
        ));
    }

    #[test]
    fn rotate_key_is_deterministic() {
        let current = test_key();
        let nonce = [7u8; 16];
        let a = rotate_key(&current, &nonce);
        let b = rotate_key(&current, &nonce);
        assert_eq!(*a, *b);
    }

    #[test]
    fn stream_contexts_are_isolated() {
        let session_key = test_key();
        let a = StreamCrypto::new(&session_key, 1);
        let b = StreamCrypto::new(&session_key, 2);
        let ct_a = a.encrypt_chunk(b"payload", 0).unwrap();
        // Stream b cannot decrypt a chunk encrypted under stream a's subkey.
        assert!(b.decrypt_chunk(&ct_a, 0).is_err());
    }

    #[test]
    fn stream_chunk_round_trips_and_binds_index() {
        let session_key = test_key();
        let stc = StreamCrypto::new(&session_key, 5);
        let ct = stc.encrypt_chunk(b"chunk data", 3).unwrap();
        let pt = stc.decrypt_chunk(&ct, 3).unwrap();
        assert_eq!(pt, b"chunk data");
        assert!(stc.decrypt_chunk(&ct, 4).is_err());
    }
}
