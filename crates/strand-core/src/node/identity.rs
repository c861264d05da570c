//! Per-peer node identity.
//!
//! A [`NodeIdentity`] carries only the 32-byte `node_id` used throughout the
//! handshake and session layer; it is not a keypair. The pre-shared seed,
//! not a public key, is what authenticates a peer in this protocol.

use strand_crypto::derive_key;
use strand_serial::Value;

/// A node's 32-byte identity, derived by hashing a local identity input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    node_id: [u8; 32],
}

impl NodeIdentity {
    /// Derive an identity from arbitrary local input (a hostname, a config
    /// value, random bytes -- whatever the deployment uses to distinguish
    /// peers). Deterministic: the same input always yields the same
    /// node_id.
    #[must_use]
    pub fn derive(local_input: &[u8]) -> Self {
        let context = Value::Map(
            [("purpose".to_string(), Value::Text("node_identity".into()))]
                .into_iter()
                .collect(),
        );
        let digest = derive_key(local_input, &context, 32);
        let mut node_id = [0u8; 32];
        node_id.copy_from_slice(&digest);
        Self { node_id }
    }

    /// Generate a random identity, for nodes that don't need a stable
    /// node_id across restarts.
    #[must_use]
    pub fn random() -> Self {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).expect("system RNG must be available");
        Self::derive(&seed)
    }

    /// The 32-byte node_id.
    #[must_use]
    pub fn node_id(&self) -> [u8; 32] {
        self.node_id
    }
}
