//! Errors for the Node orchestration API.
//!
//! Node errors wrap the lower protocol layers with enough context to decide
//! whether a caller should retry. Strings passed to the `Cow`-carrying
//! variants are almost always `&'static str` literals, so constructing one
//! of these in a hot path does not allocate.

use std::borrow::Cow;

use crate::error::{Error as ProtocolError, HandshakeError, SessionError};

/// Errors that can occur in Node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The transport layer failed to bind, send, or receive.
    #[error("transport error: {0}")]
    Transport(Cow<'static, str>),

    /// A handshake attempt failed.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// A session-layer operation failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A lower protocol-layer (frame/serializer/crypto/stream) operation
    /// failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No session exists for the given peer.
    #[error("session not found for peer {}", hex::encode(&.0[..8]))]
    SessionNotFound([u8; 32]),

    /// The node is not running.
    #[error("invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    /// An operation did not complete before its deadline.
    #[error("operation timed out: {0}")]
    Timeout(Cow<'static, str>),

    /// A configured resource limit was hit (too many peers, etc).
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(Cow<'static, str>),
}

impl NodeError {
    /// Whether this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, NodeError::Transport(_) | NodeError::Timeout(_))
    }

    /// Whether this error is permanent and will not succeed on retry.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NodeError::SessionNotFound(_) | NodeError::InvalidState(_) | NodeError::Handshake(_)
        )
    }

    /// Whether callers should retry this operation with backoff.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.is_transient() && !matches!(self, NodeError::Timeout(_))
    }

    /// Construct a transport error with static context (zero allocation).
    #[must_use]
    pub const fn transport(context: &'static str) -> Self {
        NodeError::Transport(Cow::Borrowed(context))
    }

    /// Construct a timeout error with static context (zero allocation).
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        NodeError::Timeout(Cow::Borrowed(context))
    }

    /// Construct an invalid-state error with static context (zero allocation).
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        NodeError::InvalidState(Cow::Borrowed(context))
    }
}

impl From<strand_transport::transport::TransportError> for NodeError {
    fn from(err: strand_transport::transport::TransportError) -> Self {
        NodeError::Transport(Cow::Owned(err.to_string()))
    }
}

use thiserror::Error;

/// Result type for Node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
