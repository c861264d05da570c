//! Error types for the strand core protocol.
//!
//! The codec and adapter surface typed errors; the session/stream layer
//! logs and drops malformed inbound frames without tearing down the
//! session, but tears down the session on authentication failures after
//! `ESTABLISHED` (those indicate tampering, not noise). Handshake failures
//! are terminal for that attempt; callers may retry. Raw primitive errors
//! are never leaked past [`Error`].

use thiserror::Error;

/// Top-level error type for the strand core crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame codec error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Handshake engine error.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Session-layer error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Stream-layer error.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// Serializer error.
    #[error("serializer error: {0}")]
    Serial(#[from] strand_serial::SerialError),

    /// Cryptographic adapter error.
    #[error("crypto error: {0}")]
    Crypto(#[from] strand_crypto::CryptoError),
}

/// Protocol-level frame errors (§7 "Protocol").
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The frame did not start with the expected magic bytes.
    #[error("bad magic bytes")]
    BadMagic,

    /// The frame's type byte did not match any known frame type.
    #[error("unknown frame type: 0x{0:02x}")]
    UnknownType(u8),

    /// The input ended before a complete frame could be parsed.
    #[error("truncated frame")]
    TruncatedFrame,

    /// The frame exceeded the 2 MiB maximum total size.
    #[error("oversize frame")]
    OversizeFrame,

    /// A frame of a type not valid for the current protocol phase arrived
    /// (e.g. a DATA frame before the handshake completed).
    #[error("unexpected message type")]
    UnexpectedMessage,

    /// Decryption of the frame payload failed.
    #[error("frame decryption failed")]
    DecryptFailed,
}

/// Handshake-engine errors (§7 "Handshake" plus the crypto errors that are
/// specific to the handshake's proof-of-key-possession exchanges).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The initiator's decryption of the responder's challenge failed, or
    /// the recovered plaintext did not equal `nonce_i || nonce_r`.
    #[error("bad shared seed: challenge decrypt mismatch")]
    BadSeed,

    /// The responder's decryption of the initiator's proof failed, or the
    /// recovered plaintext did not equal the responder's own `session_id`.
    #[error("bad proof: session-id decrypt mismatch")]
    BadProof,

    /// The handshake did not complete within its deadline.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// A message arrived that does not match the expected next step of
    /// the handshake transcript for the current role/state.
    #[error("transcript mismatch")]
    TranscriptMismatch,
}

/// Session-layer errors (§7 "Session").
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// An operation was attempted on a session that has already closed.
    #[error("session closed")]
    SessionClosed,

    /// An encrypt/decrypt call arrived while a key rotation was in
    /// progress and could not be serialized against it.
    #[error("rotation in progress")]
    RotationInProgress,

    /// A configured resource limit (concurrent sessions, streams per
    /// session, handshake transcripts per peer, ...) was exceeded.
    #[error("resource limit exceeded")]
    ResourceLimit,
}

/// Stream-layer errors (§7 "Stream").
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The out-of-order buffer would have grown past the advertised
    /// receive window.
    #[error("flow-control window exceeded")]
    WindowExceeded,

    /// The stream had no activity beyond its idle threshold.
    #[error("stream expired")]
    StreamExpired,

    /// An operation was attempted on a stream that has already closed.
    #[error("stream closed")]
    StreamClosed,

    /// An inbound frame's sequence number had already been delivered.
    #[error("duplicate sequence number")]
    DuplicateSequence,

    /// The outbound sequence counter for this stream would overflow.
    #[error("sequence number overflow")]
    SequenceOverflow,
}
