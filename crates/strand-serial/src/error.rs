//! Error types for varint and TLV decoding.

use thiserror::Error;

/// Failure conditions for the varint + TLV serializer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerialError {
    /// A type tag byte did not match any of the 14 known tags.
    #[error("invalid tag byte: 0x{0:02x}")]
    InvalidTag(u8),

    /// The input ended before a value could be fully decoded.
    #[error("truncated input: needed at least {needed} more byte(s)")]
    TruncatedInput {
        /// Minimum number of additional bytes required to make progress.
        needed: usize,
    },

    /// A varint used more than the 10 bytes needed to encode a `u64`.
    #[error("overlong varint: exceeded 10 bytes")]
    OverlongVarint,

    /// A decoded map's keys were not in strict lexicographic order.
    #[error("map keys are not in canonical lexicographic order")]
    NonCanonicalMapKeys,

    /// A length-prefixed text value was not valid UTF-8.
    #[error("invalid UTF-8 in text value")]
    InvalidUtf8,
}

/// Convenience result alias for serializer operations.
pub type Result<T> = std::result::Result<T, SerialError>;
