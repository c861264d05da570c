//! Cryptographic error types.
//!
//! This is the uniform failure type the crypto adapter presents to callers;
//! raw primitive errors (from `chacha20poly1305`, `blake3`, `argon2`) are
//! never leaked past this boundary.

use thiserror::Error;

/// Cryptographic errors surfaced by the adapter.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// `decrypt` failed: either the metadata/ciphertext was tampered with,
    /// or the associated data did not match what was bound at encrypt time.
    #[error("decryption failed: authentication failure")]
    DecryptFailed,

    /// A key of the wrong length was presented to a primitive.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// A nonce of the wrong length was presented to a primitive.
    #[error("invalid nonce length")]
    InvalidNonceLength,

    /// A shared seed shorter than the 32-byte minimum was supplied.
    #[error("shared seed must be at least 32 bytes, got {0}")]
    BadSeed(usize),

    /// The per-stream chunk counter would overflow its nonce space.
    #[error("chunk counter exhausted for this stream, rotation required")]
    NonceOverflow,

    /// The underlying random source failed.
    #[error("random number generation failed")]
    RandomFailed,

    /// A metadata blob could not be parsed (malformed nonce/salt framing).
    #[error("malformed crypto metadata")]
    InvalidMetadata,

    /// Any other failure of the concrete primitive not covered above.
    #[error("crypto primitive failure: {0}")]
    PrimitiveFailure(String),
}

/// Convenience result alias for crypto adapter operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
