//! # strand-transport
//!
//! Datagram transport layer for STRAND. Provides a transport-agnostic
//! [`transport::Transport`] trait, a Tokio-based UDP implementation, and an
//! in-process loopback implementation for deterministic tests, so the
//! handshake, session, and frame layers in `strand-core` never touch a raw
//! socket directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod factory;
pub mod loopback;
pub mod transport;
pub mod udp_async;

pub use factory::{TransportFactory, TransportFactoryConfig};
pub use loopback::LoopbackTransport;
pub use transport::{Transport, TransportError, TransportResult, TransportStats};
pub use udp_async::AsyncUdpTransport;
