//! Node configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::session::RotationPolicy;

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Listen address for incoming connections.
    pub listen_addr: SocketAddr,

    /// The pre-shared seed used to authenticate every handshake this node
    /// performs. Must be at least 32 bytes.
    pub shared_seed: Vec<u8>,

    /// This node's 32-byte identity, shared with peers out of band.
    pub node_id: [u8; 32],

    /// Deadline for a single handshake attempt.
    pub handshake_deadline: Duration,

    /// Session key-rotation policy applied to every session this node
    /// establishes.
    pub rotation_policy: RotationPolicy,

    /// Maximum number of concurrently established sessions.
    pub max_sessions: usize,

    /// Maximum number of in-flight inbound handshake transcripts per peer.
    pub max_pending_handshakes_per_peer: usize,
}

impl NodeConfig {
    /// Construct a config from the minimum required fields, using defaults
    /// for everything else.
    #[must_use]
    pub fn new(listen_addr: SocketAddr, shared_seed: Vec<u8>, node_id: [u8; 32]) -> Self {
        Self {
            listen_addr,
            shared_seed,
            node_id,
            handshake_deadline: crate::handshake::DEFAULT_HANDSHAKE_DEADLINE,
            rotation_policy: RotationPolicy::default(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_pending_handshakes_per_peer: DEFAULT_MAX_PENDING_HANDSHAKES_PER_PEER,
        }
    }
}

/// Default cap on concurrently established sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 4096;
/// Default cap on in-flight inbound handshake transcripts per peer.
pub const DEFAULT_MAX_PENDING_HANDSHAKES_PER_PEER: usize = 8;
