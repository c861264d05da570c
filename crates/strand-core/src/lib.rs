//! # strand-core
//!
//! Core protocol implementation for STRAND: a peer-to-peer secure
//! transport authenticated by a pre-distributed shared seed.
//!
//! This crate provides:
//! - **Handshake engine**: four-message mutual authentication that
//!   derives a shared session identity and session key
//! - **Session + stream layer**: session lifecycle, key rotation policy,
//!   and multiplexed, ordered, flow-controlled byte streams
//! - **Frame codec**: binary wire format binding AEAD metadata to frame
//!   headers as associated data
//! - **Node API**: orchestration layer tying the handshake and session
//!   layers to a transport
//!
//! ## Quick Start
//!
//! ```no_run
//! use strand_core::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::new(
//!         "0.0.0.0:0".parse()?,
//!         b"shared_seed_32_bytes_minimum!!".to_vec(),
//!         [0x01; 32],
//!     );
//!     let node = Node::new(config);
//!     node.start().await?;
//!     node.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Node (Orchestration)                       │
//! │  - handshake dispatch, session table, transport binding         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Handshake                                │
//! │   (HELLO / RESPONSE / AUTH_PROOF / FINAL)                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Session                                  │
//! │   (session id, key rotation, statistics, owned streams)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Streams                                  │
//! │   (sequencing, out-of-order buffer, flow control)                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Frames                                   │
//! │   (wire codec, AEAD metadata bound to header fields)             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod frame;
pub mod handshake;
pub mod node;
pub mod session;
pub mod stream;

pub use error::Error;
pub use frame::{FrameBuilder, FrameType, ParsedFrame};
pub use handshake::{Handshake, HandshakeRegistry, HandshakeState};
pub use node::{Node, NodeConfig, NodeError};
pub use session::{RotationPolicy, Session, SessionState, SessionStats};
pub use stream::{Stream, StreamState};

/// Protocol version (major.minor encoded as u32).
pub const PROTOCOL_VERSION: u32 = 0x0000_0001;
