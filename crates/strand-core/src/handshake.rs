//! Four-message mutual-authentication handshake.
//!
//! The crypto adapter's `encrypt` is probabilistic, so the handshake can
//! never prove key equality by comparing ciphertexts byte-for-byte.
//! Instead each side proves possession of the shared seed by decrypting a
//! value back to an expected plaintext: the responder's `challenge_ct`
//! must decrypt to `nonce_i || nonce_r`, and the initiator's `proof_ct`
//! must decrypt to `session_id`. `commitment` in Message 1 is carried and
//! logged opaquely -- it is never recomputed or compared, since `hash` is
//! itself probabilistic.
//!
//! ```text
//! IDLE -> HELLO_SENT | HELLO_RECEIVED
//!      -> RESPONSE_SENT | RESPONSE_RECEIVED
//!      -> PROOF_SENT | PROOF_RECEIVED
//!      -> ESTABLISHED
//! ```
//!
//! Any message out of order for the current role/state moves to `Failed`
//! and the transcript is dropped.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use strand_crypto::{decrypt, derive_key, encrypt, hash, Metadata};
use strand_serial::Value;
use zeroize::Zeroizing;

use crate::error::HandshakeError;

/// A 32-byte node identifier.
pub type NodeId = [u8; 32];
/// A 32-byte handshake nonce.
pub type Nonce = [u8; 32];
/// The 8-byte symmetric session identifier.
pub type SessionId = [u8; 8];

/// Default deadline for a handshake attempt to reach `ESTABLISHED`.
pub const DEFAULT_HANDSHAKE_DEADLINE: Duration = Duration::from_secs(10);

/// The handshake's state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No messages exchanged yet.
    Idle,
    /// Initiator: sent Message 1.
    HelloSent,
    /// Responder: received Message 1.
    HelloReceived,
    /// Responder: sent Message 2.
    ResponseSent,
    /// Initiator: received Message 2.
    ResponseReceived,
    /// Initiator: sent Message 3.
    ProofSent,
    /// Responder: received Message 3.
    ProofReceived,
    /// Both sides: the session key and session id are ready for use.
    Established,
    /// Any deviation from the expected message sequence.
    Failed,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn xor32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// `XOR(nonce_i, nonce_r, node_id_i, node_id_r)[:8]`, symmetric in both
/// peers' inputs.
#[must_use]
pub fn compute_session_id(nonce_i: &Nonce, nonce_r: &Nonce, node_id_i: &NodeId, node_id_r: &NodeId) -> SessionId {
    let x = xor32(nonce_i, nonce_r);
    let x = xor32(&x, node_id_i);
    let x = xor32(&x, node_id_r);
    let mut session_id = [0u8; 8];
    session_id.copy_from_slice(&x[..8]);
    session_id
}

fn session_key_context(nonce_i: &Nonce, nonce_r: &Nonce, node_id_i: &NodeId, node_id_r: &NodeId, timestamp: u64) -> Value {
    let mut map = BTreeMap::new();
    map.insert("purpose".to_string(), Value::Text("session_key".into()));
    map.insert("nonce_i".to_string(), Value::Bytes(nonce_i.to_vec()));
    map.insert("nonce_r".to_string(), Value::Bytes(nonce_r.to_vec()));
    map.insert("node_id_i".to_string(), Value::Bytes(node_id_i.to_vec()));
    map.insert("node_id_r".to_string(), Value::Bytes(node_id_r.to_vec()));
    map.insert("timestamp".to_string(), Value::from_u64_fitting(timestamp));
    Value::Map(map)
}

fn get_bytes<'a>(map: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a [u8]> {
    match map.get(key) {
        Some(Value::Bytes(b)) => Some(b.as_slice()),
        _ => None,
    }
}

fn array32(bytes: &[u8]) -> Result<[u8; 32], HandshakeError> {
    bytes.try_into().map_err(|_| HandshakeError::TranscriptMismatch)
}

fn array8(bytes: &[u8]) -> Result<[u8; 8], HandshakeError> {
    bytes.try_into().map_err(|_| HandshakeError::TranscriptMismatch)
}

fn decode_map(bytes: &[u8]) -> Result<BTreeMap<String, Value>, HandshakeError> {
    let (value, _) = Value::decode(bytes).map_err(|_| HandshakeError::TranscriptMismatch)?;
    match value {
        Value::Map(m) => Ok(m),
        _ => Err(HandshakeError::TranscriptMismatch),
    }
}

/// One in-progress or completed handshake attempt.
pub struct Handshake {
    is_initiator: bool,
    state: HandshakeState,
    shared_seed: Zeroizing<Vec<u8>>,
    node_id_i: NodeId,
    node_id_r: Option<NodeId>,
    nonce_i: Nonce,
    nonce_r: Option<Nonce>,
    timestamp: u64,
    session_id: Option<SessionId>,
    session_key: Option<Zeroizing<Vec<u8>>>,
}

impl Handshake {
    /// Start a handshake as the initiator, producing the HELLO message
    /// bytes to send.
    pub fn initiate(node_id_i: NodeId, shared_seed: &[u8], nonce_i: Nonce) -> Result<(Self, Vec<u8>), HandshakeError> {
        let timestamp = now_unix();
        let commitment_ctx = {
            let mut m = BTreeMap::new();
            m.insert("purpose".to_string(), Value::Text("hello_commitment".into()));
            m.insert("timestamp".to_string(), Value::from_u64_fitting(timestamp));
            Value::Map(m)
        };
        let mut commitment_input = Vec::with_capacity(64);
        commitment_input.extend_from_slice(&nonce_i);
        commitment_input.extend_from_slice(&node_id_i);
        let commitment =
            hash(&commitment_input, &commitment_ctx).map_err(|_| HandshakeError::TranscriptMismatch)?;

        let mut msg = BTreeMap::new();
        msg.insert("msg_type".to_string(), Value::Text("HELLO".into()));
        msg.insert("node_id".to_string(), Value::Bytes(node_id_i.to_vec()));
        msg.insert("nonce_i".to_string(), Value::Bytes(nonce_i.to_vec()));
        msg.insert("timestamp".to_string(), Value::from_u64_fitting(timestamp));
        msg.insert("commitment".to_string(), Value::Bytes(commitment.to_vec()));
        let bytes = Value::Map(msg).to_bytes();

        let handshake = Handshake {
            is_initiator: true,
            state: HandshakeState::HelloSent,
            shared_seed: Zeroizing::new(shared_seed.to_vec()),
            node_id_i,
            node_id_r: None,
            nonce_i,
            nonce_r: None,
            timestamp,
            session_id: None,
            session_key: None,
        };
        Ok((handshake, bytes))
    }

    /// Respond to an inbound HELLO, producing a new `Handshake` and the
    /// RESPONSE message bytes to send back.
    pub fn respond_to_hello(
        hello_bytes: &[u8],
        node_id_r: NodeId,
        shared_seed: &[u8],
        nonce_r: Nonce,
    ) -> Result<(Self, Vec<u8>), HandshakeError> {
        let msg = decode_map(hello_bytes)?;
        if msg.get("msg_type") != Some(&Value::Text("HELLO".into())) {
            return Err(HandshakeError::TranscriptMismatch);
        }
        let node_id_i = array32(get_bytes(&msg, "node_id").ok_or(HandshakeError::TranscriptMismatch)?)?;
        let nonce_i = array32(get_bytes(&msg, "nonce_i").ok_or(HandshakeError::TranscriptMismatch)?)?;

        let mut challenge_plain = Vec::with_capacity(64);
        challenge_plain.extend_from_slice(&nonce_i);
        challenge_plain.extend_from_slice(&nonce_r);

        let ad = {
            let mut m = BTreeMap::new();
            m.insert("purpose".to_string(), Value::Text("handshake_challenge".into()));
            m.insert("node_id_i".to_string(), Value::Bytes(node_id_i.to_vec()));
            m.insert("node_id_r".to_string(), Value::Bytes(node_id_r.to_vec()));
            Value::Map(m)
        };
        let (challenge_ct, meta) =
            encrypt(&challenge_plain, shared_seed, &ad).map_err(|_| HandshakeError::TranscriptMismatch)?;

        let mut response = BTreeMap::new();
        response.insert("msg_type".to_string(), Value::Text("RESPONSE".into()));
        response.insert("node_id_r".to_string(), Value::Bytes(node_id_r.to_vec()));
        response.insert("nonce_r".to_string(), Value::Bytes(nonce_r.to_vec()));
        response.insert("challenge_ct".to_string(), Value::Bytes(challenge_ct));
        response.insert("meta".to_string(), Value::Bytes(meta.as_bytes().to_vec()));
        let bytes = Value::Map(response).to_bytes();

        let handshake = Handshake {
            is_initiator: false,
            state: HandshakeState::HelloReceived,
            shared_seed: Zeroizing::new(shared_seed.to_vec()),
            node_id_i,
            node_id_r: Some(node_id_r),
            nonce_i,
            nonce_r: Some(nonce_r),
            timestamp: now_unix(),
            session_id: None,
            session_key: None,
        };
        Ok((handshake, bytes))
    }

    /// Initiator: handle an inbound RESPONSE, producing the AUTH_PROOF
    /// message bytes to send. Fails with [`HandshakeError::BadSeed`] if
    /// the challenge does not decrypt to the expected plaintext.
    pub fn handle_response(&mut self, response_bytes: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if !self.is_initiator || self.state != HandshakeState::HelloSent {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::TranscriptMismatch);
        }
        let msg = decode_map(response_bytes)?;
        if msg.get("msg_type") != Some(&Value::Text("RESPONSE".into())) {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::TranscriptMismatch);
        }
        let node_id_r = array32(get_bytes(&msg, "node_id_r").ok_or(HandshakeError::TranscriptMismatch)?)?;
        let nonce_r = array32(get_bytes(&msg, "nonce_r").ok_or(HandshakeError::TranscriptMismatch)?)?;
        let challenge_ct = get_bytes(&msg, "challenge_ct").ok_or(HandshakeError::TranscriptMismatch)?;
        let meta = Metadata::from_bytes(get_bytes(&msg, "meta").ok_or(HandshakeError::TranscriptMismatch)?.to_vec());

        let ad = {
            let mut m = BTreeMap::new();
            m.insert("purpose".to_string(), Value::Text("handshake_challenge".into()));
            m.insert("node_id_i".to_string(), Value::Bytes(self.node_id_i.to_vec()));
            m.insert("node_id_r".to_string(), Value::Bytes(node_id_r.to_vec()));
            Value::Map(m)
        };

        let expected: Vec<u8> = self.nonce_i.iter().chain(nonce_r.iter()).copied().collect();
        let recovered = match decrypt(challenge_ct, &self.shared_seed, &meta, &ad) {
            Ok(p) => p,
            Err(_) => {
                self.state = HandshakeState::Failed;
                return Err(HandshakeError::BadSeed);
            }
        };
        if recovered != expected {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::BadSeed);
        }

        self.node_id_r = Some(node_id_r);
        self.nonce_r = Some(nonce_r);
        self.state = HandshakeState::ResponseReceived;

        let session_id = compute_session_id(&self.nonce_i, &nonce_r, &self.node_id_i, &node_id_r);
        let proof_ad = {
            let mut m = BTreeMap::new();
            m.insert("purpose".to_string(), Value::Text("auth_proof".into()));
            m.insert("session_id".to_string(), Value::Bytes(session_id.to_vec()));
            Value::Map(m)
        };
        let (proof_ct, meta2) =
            encrypt(&session_id, &self.shared_seed, &proof_ad).map_err(|_| HandshakeError::TranscriptMismatch)?;

        self.session_id = Some(session_id);

        let mut proof = BTreeMap::new();
        proof.insert("msg_type".to_string(), Value::Text("AUTH_PROOF".into()));
        proof.insert("session_id".to_string(), Value::Bytes(session_id.to_vec()));
        proof.insert("proof_ct".to_string(), Value::Bytes(proof_ct));
        proof.insert("meta2".to_string(), Value::Bytes(meta2.as_bytes().to_vec()));
        // Carried so the responder can find its pending transcript in the
        // handshake registry, which is keyed by (node_id_i, nonce_i) rather
        // than by source address.
        proof.insert("node_id_i".to_string(), Value::Bytes(self.node_id_i.to_vec()));
        proof.insert("nonce_i".to_string(), Value::Bytes(self.nonce_i.to_vec()));
        self.state = HandshakeState::ProofSent;
        Ok(Value::Map(proof).to_bytes())
    }

    /// Responder: handle an inbound AUTH_PROOF, producing the FINAL
    /// message bytes to send. Fails with [`HandshakeError::BadProof`] if
    /// the proof does not decrypt to this side's own `session_id`.
    pub fn handle_auth_proof(&mut self, proof_bytes: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if self.is_initiator || self.state != HandshakeState::HelloReceived {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::TranscriptMismatch);
        }
        let msg = decode_map(proof_bytes)?;
        if msg.get("msg_type") != Some(&Value::Text("AUTH_PROOF".into())) {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::TranscriptMismatch);
        }
        let claimed_session_id = array8(get_bytes(&msg, "session_id").ok_or(HandshakeError::TranscriptMismatch)?)?;
        let proof_ct = get_bytes(&msg, "proof_ct").ok_or(HandshakeError::TranscriptMismatch)?;
        let meta2 = Metadata::from_bytes(get_bytes(&msg, "meta2").ok_or(HandshakeError::TranscriptMismatch)?.to_vec());

        let nonce_r = self.nonce_r.ok_or(HandshakeError::TranscriptMismatch)?;
        let node_id_r = self.node_id_r.ok_or(HandshakeError::TranscriptMismatch)?;
        let own_session_id = compute_session_id(&self.nonce_i, &nonce_r, &self.node_id_i, &node_id_r);
        if claimed_session_id != own_session_id {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::BadProof);
        }

        let proof_ad = {
            let mut m = BTreeMap::new();
            m.insert("purpose".to_string(), Value::Text("auth_proof".into()));
            m.insert("session_id".to_string(), Value::Bytes(own_session_id.to_vec()));
            Value::Map(m)
        };
        let recovered = match decrypt(proof_ct, &self.shared_seed, &meta2, &proof_ad) {
            Ok(p) => p,
            Err(_) => {
                self.state = HandshakeState::Failed;
                return Err(HandshakeError::BadProof);
            }
        };
        if recovered != own_session_id {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::BadProof);
        }

        self.session_id = Some(own_session_id);
        self.state = HandshakeState::ProofReceived;
        self.finish_and_derive_key()?;

        let mut fin = BTreeMap::new();
        fin.insert("msg_type".to_string(), Value::Text("FINAL".into()));
        fin.insert("session_id".to_string(), Value::Bytes(own_session_id.to_vec()));
        self.state = HandshakeState::Established;
        Ok(Value::Map(fin).to_bytes())
    }

    /// Initiator: handle the inbound FINAL message, completing the
    /// handshake.
    pub fn handle_final(&mut self, final_bytes: &[u8]) -> Result<(), HandshakeError> {
        if !self.is_initiator || self.state != HandshakeState::ProofSent {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::TranscriptMismatch);
        }
        let msg = decode_map(final_bytes)?;
        if msg.get("msg_type") != Some(&Value::Text("FINAL".into())) {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::TranscriptMismatch);
        }
        let session_id = array8(get_bytes(&msg, "session_id").ok_or(HandshakeError::TranscriptMismatch)?)?;
        if Some(session_id) != self.session_id {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::TranscriptMismatch);
        }
        self.finish_and_derive_key()?;
        self.state = HandshakeState::Established;
        Ok(())
    }

    fn finish_and_derive_key(&mut self) -> Result<(), HandshakeError> {
        let nonce_r = self.nonce_r.ok_or(HandshakeError::TranscriptMismatch)?;
        let node_id_r = self.node_id_r.ok_or(HandshakeError::TranscriptMismatch)?;
        let ctx = session_key_context(&self.nonce_i, &nonce_r, &self.node_id_i, &node_id_r, self.timestamp);
        let key = derive_key(&self.shared_seed, &ctx, 32);
        self.session_key = Some(Zeroizing::new(key));
        Ok(())
    }

    /// The current state of this handshake attempt.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The derived session id, once established.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// The derived session key, once established. Both peers derive the
    /// same bytes independently via [`derive_key`].
    #[must_use]
    pub fn session_key(&self) -> Option<&Zeroizing<Vec<u8>>> {
        self.session_key.as_ref()
    }

    /// The peer's node id, once known.
    #[must_use]
    pub fn peer_node_id(&self) -> Option<NodeId> {
        if self.is_initiator {
            self.node_id_r
        } else {
            Some(self.node_id_i)
        }
    }

    /// The initiator's nonce, the other half of this transcript's
    /// `(peer_node_id, nonce_i)` registry key.
    #[must_use]
    pub fn nonce_i(&self) -> Nonce {
        self.nonce_i
    }
}

/// Read the `(node_id_i, nonce_i)` pair out of an AUTH_PROOF message
/// without consuming it, so the responder can look up its pending
/// transcript in the [`HandshakeRegistry`] before touching any state.
pub fn peek_auth_proof_key(proof_bytes: &[u8]) -> Result<(NodeId, Nonce), HandshakeError> {
    let msg = decode_map(proof_bytes)?;
    if msg.get("msg_type") != Some(&Value::Text("AUTH_PROOF".into())) {
        return Err(HandshakeError::TranscriptMismatch);
    }
    let node_id_i = array32(get_bytes(&msg, "node_id_i").ok_or(HandshakeError::TranscriptMismatch)?)?;
    let nonce_i = array32(get_bytes(&msg, "nonce_i").ok_or(HandshakeError::TranscriptMismatch)?)?;
    Ok((node_id_i, nonce_i))
}

/// Tracks concurrent in-progress handshakes, keyed by `(peer_node_id,
/// nonce_i)` so that a retried or late message from one peer cannot
/// corrupt another peer's in-flight transcript.
#[derive(Default)]
pub struct HandshakeRegistry {
    pending: DashMap<(NodeId, Nonce), Handshake>,
}

impl HandshakeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handshake, keyed by `(peer_node_id, nonce_i)`. A second
    /// inbound HELLO for the same peer discards any prior transcript for
    /// a different `nonce_i`, per the "retry" rule; the registry itself
    /// is keyed by the pair, so a fresh nonce naturally creates a fresh
    /// slot rather than colliding.
    pub fn insert(&self, peer_node_id: NodeId, nonce_i: Nonce, handshake: Handshake) {
        self.pending.insert((peer_node_id, nonce_i), handshake);
    }

    /// Remove and return a handshake transcript.
    pub fn remove(&self, peer_node_id: NodeId, nonce_i: Nonce) -> Option<Handshake> {
        self.pending.remove(&(peer_node_id, nonce_i)).map(|(_, h)| h)
    }

    /// Current count of pending (non-established) handshakes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Count of pending handshakes currently attributed to `peer_node_id`,
    /// so a node can cap how many a single peer may have in flight.
    #[must_use]
    pub fn count_for_peer(&self, peer_node_id: NodeId) -> usize {
        self.pending.iter().filter(|entry| entry.key().0 == peer_node_id).count()
    }

    /// Whether the registry currently holds no pending handshakes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Vec<u8> {
        b"shared_seed_32_bytes_minimum!!".to_vec()
    }

    #[test]
    fn happy_path_handshake_establishes_matching_session_id_and_key() {
        let node_id_i = [0x01u8; 32];
        let node_id_r = [0x02u8; 32];
        let nonce_i = [0x03u8; 32];
        let nonce_r = [0x04u8; 32];

        let (mut initiator, hello) = Handshake::initiate(node_id_i, &seed(), nonce_i).unwrap();
        let (mut responder, response) = Handshake::respond_to_hello(&hello, node_id_r, &seed(), nonce_r).unwrap();
        let auth_proof = initiator.handle_response(&response).unwrap();
        let fin = responder.handle_auth_proof(&auth_proof).unwrap();
        initiator.handle_final(&fin).unwrap();

        assert_eq!(initiator.state(), HandshakeState::Established);
        assert_eq!(responder.state(), HandshakeState::Established);
        assert_eq!(initiator.session_id(), responder.session_id());
        assert_eq!(
            initiator.session_key().unwrap().as_slice(),
            responder.session_key().unwrap().as_slice()
        );
    }

    #[test]
    fn bad_shared_seed_fails_at_response() {
        let node_id_i = [0x01u8; 32];
        let node_id_r = [0x02u8; 32];
        let nonce_i = [0x03u8; 32];
        let nonce_r = [0x04u8; 32];

        let (mut initiator, hello) = Handshake::initiate(node_id_i, b"initiator_seed_32_bytes_min!!!!", nonce_i).unwrap();
        let (_responder, response) =
            Handshake::respond_to_hello(&hello, node_id_r, b"responder_seed_32_bytes_min!!!!", nonce_r).unwrap();

        let result = initiator.handle_response(&response);
        assert!(matches!(result, Err(HandshakeError::BadSeed)));
        assert_eq!(initiator.state(), HandshakeState::Failed);
    }

    #[test]
    fn replayed_response_rejected_under_fresh_initiator_nonce() {
        let node_id_i = [0x01u8; 32];
        let node_id_r = [0x02u8; 32];
        let nonce_i_first = [0x03u8; 32];
        let nonce_r = [0x04u8; 32];

        let (_first_initiator, hello1) = Handshake::initiate(node_id_i, &seed(), nonce_i_first).unwrap();
        let (_responder, captured_response) = Handshake::respond_to_hello(&hello1, node_id_r, &seed(), nonce_r).unwrap();

        // A second handshake attempt with a fresh initiator nonce.
        let nonce_i_second = [0x05u8; 32];
        let (mut second_initiator, _hello2) = Handshake::initiate(node_id_i, &seed(), nonce_i_second).unwrap();

        let result = second_initiator.handle_response(&captured_response);
        assert!(matches!(result, Err(HandshakeError::BadSeed)));
    }

    #[test]
    fn tampered_auth_proof_fails_with_bad_proof() {
        let node_id_i = [0x01u8; 32];
        let node_id_r = [0x02u8; 32];
        let nonce_i = [0x03u8; 32];
        let nonce_r = [0x04u8; 32];

        let (mut initiator, hello) = Handshake::initiate(node_id_i, &seed(), nonce_i).unwrap();
        let (mut responder, response) = Handshake::respond_to_hello(&hello, node_id_r, &seed(), nonce_r).unwrap();
        let mut auth_proof = initiator.handle_response(&response).unwrap();
        // Flip a byte well inside the encoded map, away from the length
        // framing at the very front.
        let idx = auth_proof.len() - 3;
        auth_proof[idx] ^= 0xff;

        let result = responder.handle_auth_proof(&auth_proof);
        assert!(result.is_err());
    }

    #[test]
    fn handshake_registry_keys_by_peer_and_nonce() {
        let registry = HandshakeRegistry::new();
        let node_id_i = [0x01u8; 32];
        let nonce_i = [0x03u8; 32];
        let (handshake, _hello) = Handshake::initiate(node_id_i, &seed(), nonce_i).unwrap();
        registry.insert(node_id_i, nonce_i, handshake);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(node_id_i, nonce_i).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_counts_pending_handshakes_per_peer() {
        let registry = HandshakeRegistry::new();
        let node_id_i = [0x01u8; 32];
        let other_peer = [0x09u8; 32];

        let (h1, _) = Handshake::initiate(node_id_i, &seed(), [0x03u8; 32]).unwrap();
        let (h2, _) = Handshake::initiate(node_id_i, &seed(), [0x04u8; 32]).unwrap();
        let (h3, _) = Handshake::initiate(other_peer, &seed(), [0x05u8; 32]).unwrap();
        registry.insert(node_id_i, [0x03u8; 32], h1);
        registry.insert(node_id_i, [0x04u8; 32], h2);
        registry.insert(other_peer, [0x05u8; 32], h3);

        assert_eq!(registry.count_for_peer(node_id_i), 2);
        assert_eq!(registry.count_for_peer(other_peer), 1);
    }

    #[test]
    fn auth_proof_carries_initiator_identity_for_registry_lookup() {
        let node_id_i = [0x01u8; 32];
        let node_id_r = [0x02u8; 32];
        let nonce_i = [0x03u8; 32];
        let nonce_r = [0x04u8; 32];

        let (mut initiator, hello) = Handshake::initiate(node_id_i, &seed(), nonce_i).unwrap();
        let (_responder, response) = Handshake::respond_to_hello(&hello, node_id_r, &seed(), nonce_r).unwrap();
        let auth_proof = initiator.handle_response(&response).unwrap();

        let (peer_node_id, peer_nonce_i) = peek_auth_proof_key(&auth_proof).unwrap();
        assert_eq!(peer_node_id, node_id_i);
        assert_eq!(peer_nonce_i, nonce_i);
        assert_eq!(initiator.nonce_i(), nonce_i);
    }
}
