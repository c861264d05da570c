//! Node: the high-level protocol orchestrator.
//!
//! A `Node` binds one transport and drives both sides of the protocol
//! over it: it initiates handshakes for outbound [`Node::connect`] calls
//! and answers inbound handshakes from its receive loop, landing
//! established sessions in a shared table keyed by [`SessionId`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use strand_serial::Value;
use strand_transport::transport::Transport;
use strand_transport::udp_async::AsyncUdpTransport;
use tokio::sync::{mpsc, oneshot, Mutex};
use zeroize::Zeroizing;

use crate::frame::{FrameBuilder, FrameType, ParsedFrame, HANDSHAKE_SESSION_ID};
use crate::handshake::{peek_auth_proof_key, Handshake, HandshakeRegistry, NodeId, SessionId};
use crate::node::config::NodeConfig;
use crate::node::error::{NodeError, Result};
use crate::session::Session;
use crate::stream::CONTROL_STREAM_ID;

const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

struct NodeInner {
    config: NodeConfig,
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
    session_peers: DashMap<SessionId, SocketAddr>,
    pending_initiator: DashMap<SocketAddr, oneshot::Sender<Vec<u8>>>,
    handshake_registry: HandshakeRegistry,
    accepted_tx: mpsc::UnboundedSender<SessionId>,
    accepted_rx: Mutex<mpsc::UnboundedReceiver<SessionId>>,
    running: AtomicBool,
    transport: Mutex<Option<Arc<dyn Transport>>>,
}

/// The protocol orchestration layer: one per local endpoint.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Construct a node from its configuration. Does not bind a socket;
    /// call [`Self::start`] to begin listening.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(NodeInner {
                config,
                sessions: DashMap::new(),
                session_peers: DashMap::new(),
                pending_initiator: DashMap::new(),
                handshake_registry: HandshakeRegistry::new(),
                accepted_tx,
                accepted_rx: Mutex::new(accepted_rx),
                running: AtomicBool::new(false),
                transport: Mutex::new(None),
            }),
        }
    }

    /// This node's 32-byte identity, as configured.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.inner.config.node_id
    }

    /// The address the node is actually listening on, if started.
    pub async fn listen_addr(&self) -> Result<SocketAddr> {
        let transport = self.inner.transport.lock().await;
        match transport.as_ref() {
            Some(t) => Ok(t.local_addr()?),
            None => Err(NodeError::invalid_state("transport not initialized")),
        }
    }

    /// Bind the transport and start the background receive loop.
    pub async fn start(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NodeError::invalid_state("node already running"));
        }

        let transport = AsyncUdpTransport::bind(self.inner.config.listen_addr).await?;
        let transport: Arc<dyn Transport> = Arc::new(transport);
        *self.inner.transport.lock().await = Some(Arc::clone(&transport));

        tracing::info!(node_id = %hex::encode(self.node_id()), addr = %transport.local_addr()?, "node started");

        let node = self.clone();
        tokio::spawn(async move {
            node.receive_loop().await;
        });

        Ok(())
    }

    /// Stop the node: close every owned session and the transport.
    pub async fn stop(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NodeError::invalid_state("node not running"));
        }

        for entry in self.inner.sessions.iter() {
            entry.value().lock().await.close();
        }
        self.inner.sessions.clear();
        self.inner.session_peers.clear();

        if let Some(transport) = self.inner.transport.lock().await.take() {
            transport.close().await?;
        }

        tracing::info!("node stopped");
        Ok(())
    }

    /// Look up an established session.
    #[must_use]
    pub fn session(&self, session_id: SessionId) -> Option<Arc<Mutex<Session>>> {
        self.inner.sessions.get(&session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of currently established sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Wait for the next session established by an inbound handshake
    /// (i.e. one this node did not initiate via [`Self::connect`]).
    ///
    /// Since [`SessionId`] is derived from both peers' random nonces, a
    /// listener has no way to know a responder-side session's id in
    /// advance; this is the only way to discover one.
    ///
    /// # Errors
    ///
    /// Returns an error if the node was stopped and no further sessions
    /// will ever be accepted.
    pub async fn accept(&self) -> Result<SessionId> {
        let mut rx = self.inner.accepted_rx.lock().await;
        rx.recv().await.ok_or_else(|| NodeError::invalid_state("node stopped"))
    }

    /// Initiate a handshake with `peer_addr`/`peer_node_id` and return the
    /// resulting session id once established.
    ///
    /// # Errors
    ///
    /// Returns a handshake error if authentication fails, or a timeout if
    /// the peer does not respond within the configured handshake deadline.
    pub async fn connect(&self, peer_addr: SocketAddr, peer_node_id: NodeId) -> Result<SessionId> {
        if self.inner.sessions.len() >= self.inner.config.max_sessions {
            return Err(NodeError::ResourceLimit("max sessions reached".into()));
        }

        let transport = self.current_transport().await?;

        let mut nonce_i = [0u8; 32];
        getrandom::getrandom(&mut nonce_i).map_err(|_| NodeError::transport("rng failure"))?;

        let (mut handshake, hello) =
            Handshake::initiate(self.node_id(), &self.inner.config.shared_seed, nonce_i)?;
        let hello_frame = FrameBuilder::new(FrameType::Handshake).payload(hello).build().map_err(crate::error::Error::from)?;

        let response = self.exchange(&transport, peer_addr, hello_frame).await?;
        let proof = handshake.handle_response(&response)?;
        let proof_frame = FrameBuilder::new(FrameType::Auth).payload(proof).build().map_err(crate::error::Error::from)?;

        let final_bytes = self.exchange(&transport, peer_addr, proof_frame).await?;
        handshake.handle_final(&final_bytes)?;

        let session_id = handshake.session_id().expect("established handshake has a session id");
        let session_key = handshake.session_key().expect("established handshake has a session key").clone();
        self.install_session(session_id, peer_node_id, session_key, peer_addr, true);

        Ok(session_id)
    }

    async fn current_transport(&self) -> Result<Arc<dyn Transport>> {
        self.inner
            .transport
            .lock()
            .await
            .clone()
            .ok_or_else(|| NodeError::invalid_state("node not started"))
    }

    /// Send one handshake-phase frame and wait for the correlated reply.
    async fn exchange(&self, transport: &Arc<dyn Transport>, peer_addr: SocketAddr, frame: Vec<u8>) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending_initiator.insert(peer_addr, tx);
        transport.send_to(&frame, peer_addr).await?;

        let deadline = self.inner.config.handshake_deadline;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(_)) => Err(NodeError::transport("handshake channel closed")),
            Err(_) => {
                self.inner.pending_initiator.remove(&peer_addr);
                Err(NodeError::timeout("handshake deadline exceeded"))
            }
        }
    }

    fn install_session(
        &self,
        session_id: SessionId,
        peer_node_id: NodeId,
        session_key: Zeroizing<Vec<u8>>,
        peer_addr: SocketAddr,
        is_initiator: bool,
    ) {
        let session = Session::new(session_id, peer_node_id, session_key, is_initiator)
            .with_rotation_policy(self.inner.config.rotation_policy);
        self.inner.sessions.insert(session_id, Arc::new(Mutex::new(session)));
        self.inner.session_peers.insert(session_id, peer_addr);
        if !is_initiator {
            // The receiver end only ever closes if the node itself has been
            // dropped, in which case there is no one left to notify.
            let _ = self.inner.accepted_tx.send(session_id);
        }
    }

    async fn receive_loop(&self) {
        let transport = match self.current_transport().await {
            Ok(t) => t,
            Err(_) => return,
        };
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        while self.inner.running.load(Ordering::SeqCst) {
            let (len, from) = match transport.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(%err, "transport receive failed");
                    continue;
                }
            };

            let Ok((parsed, _)) = ParsedFrame::parse(&buf[..len]) else {
                tracing::debug!(%from, "dropping malformed frame");
                continue;
            };

            if parsed.session_id == HANDSHAKE_SESSION_ID {
                self.handle_handshake_frame(&transport, from, &parsed).await;
            } else {
                self.handle_data_frame(&transport, from, &parsed).await;
            }
        }
    }

    async fn handle_handshake_frame(&self, transport: &Arc<dyn Transport>, from: SocketAddr, parsed: &ParsedFrame<'_>) {
        // A reply to a handshake we initiated takes priority over treating
        // this as a fresh inbound message from the same address.
        if matches!(parsed.frame_type, FrameType::Handshake | FrameType::Auth) {
            if let Some((_, tx)) = self.inner.pending_initiator.remove(&from) {
                let _ = tx.send(parsed.payload.to_vec());
                return;
            }
        }

        match parsed.frame_type {
            FrameType::Handshake => self.accept_hello(transport, from, parsed.payload).await,
            FrameType::Auth => self.accept_auth_proof(transport, from, parsed.payload).await,
            _ => tracing::debug!(%from, "unexpected frame type during handshake"),
        }
    }

    async fn accept_hello(&self, transport: &Arc<dyn Transport>, from: SocketAddr, hello: &[u8]) {
        let mut nonce_r = [0u8; 32];
        if getrandom::getrandom(&mut nonce_r).is_err() {
            return;
        }
        let Ok((handshake, response)) =
            Handshake::respond_to_hello(hello, self.node_id(), &self.inner.config.shared_seed, nonce_r)
        else {
            tracing::debug!(%from, "rejected malformed hello");
            return;
        };

        // respond_to_hello always sets peer_node_id on a responder-role
        // handshake, so this is infallible in practice.
        let Some(peer_node_id) = handshake.peer_node_id() else {
            return;
        };
        let nonce_i = handshake.nonce_i();

        let pending_for_peer = self.inner.handshake_registry.count_for_peer(peer_node_id);
        if pending_for_peer >= self.inner.config.max_pending_handshakes_per_peer {
            tracing::warn!(
                %from,
                peer_node_id = %hex::encode(peer_node_id),
                pending_for_peer,
                "rejecting hello: too many pending handshakes for this peer"
            );
            return;
        }

        self.inner.handshake_registry.insert(peer_node_id, nonce_i, handshake);
        if let Ok(frame) = FrameBuilder::new(FrameType::Handshake).payload(response).build() {
            let _ = transport.send_to(&frame, from).await;
        }
    }

    async fn accept_auth_proof(&self, transport: &Arc<dyn Transport>, from: SocketAddr, proof: &[u8]) {
        let Ok((peer_node_id, nonce_i)) = peek_auth_proof_key(proof) else {
            tracing::debug!(%from, "malformed auth proof");
            return;
        };
        let Some(mut handshake) = self.inner.handshake_registry.remove(peer_node_id, nonce_i) else {
            tracing::debug!(%from, "auth proof with no pending handshake");
            return;
        };

        let Ok(final_bytes) = handshake.handle_auth_proof(proof) else {
            tracing::warn!(%from, "handshake authentication failed");
            return;
        };

        if let Ok(frame) = FrameBuilder::new(FrameType::Handshake).payload(final_bytes).build() {
            let _ = transport.send_to(&frame, from).await;
        }

        if let (Some(session_id), Some(session_key), Some(peer_node_id)) =
            (handshake.session_id(), handshake.session_key(), handshake.peer_node_id())
        {
            self.install_session(session_id, peer_node_id, session_key.clone(), from, false);
        }
    }

    async fn handle_data_frame(&self, transport: &Arc<dyn Transport>, from: SocketAddr, parsed: &ParsedFrame<'_>) {
        let Some(session) = self.session(parsed.session_id) else {
            tracing::debug!("frame for unknown session");
            return;
        };

        match parsed.frame_type {
            FrameType::Data => self.handle_data_payload(transport, from, &session, parsed).await,
            FrameType::Control => self.handle_control_frame(transport, from, &session, parsed).await,
            FrameType::StreamControl => self.handle_stream_control_frame(&session, parsed).await,
            FrameType::Handshake | FrameType::Auth => {
                tracing::debug!(%from, "unexpected handshake-phase frame on an established session");
            }
        }
    }

    async fn handle_data_payload(
        &self,
        transport: &Arc<dyn Transport>,
        from: SocketAddr,
        session: &Arc<Mutex<Session>>,
        parsed: &ParsedFrame<'_>,
    ) {
        let mut session = session.lock().await;
        let Some(stream) = session.stream(parsed.stream_id) else {
            tracing::debug!(stream_id = parsed.stream_id, "data frame for unknown stream");
            return;
        };
        match stream.receive(parsed.sequence, parsed.sequence, parsed.payload) {
            Ok(delivered) => {
                let total: u64 = delivered.iter().map(|d| d.len() as u64).sum();
                drop(delivered);
                session.record_received(total);
                if total > 0 {
                    self.grant_credit(transport, from, &mut session, parsed.stream_id, total).await;
                }
                self.maybe_rotate(transport, from, &mut session).await;
            }
            Err(err) => tracing::warn!(%err, "dropping frame: decrypt/sequence check failed"),
        }
    }

    async fn handle_control_frame(
        &self,
        transport: &Arc<dyn Transport>,
        from: SocketAddr,
        session: &Arc<Mutex<Session>>,
        parsed: &ParsedFrame<'_>,
    ) {
        let mut session = session.lock().await;
        let Ok(plaintext) = crate::frame::decrypt_parsed(parsed, session.current_key()) else {
            tracing::debug!(%from, "dropping control frame: decrypt failed");
            return;
        };

        match decode_rotation_message(&plaintext) {
            Some(RotationMessage::Request(nonce)) => {
                // Responder role for rotation: apply the proposed nonce
                // directly, under the key the request itself arrived under.
                let old_key = session.current_key().to_vec();
                if let Err(err) = session.rotate(&nonce) {
                    tracing::warn!(%from, %err, "rejected rotation request");
                    return;
                }
                tracing::debug!(session_id = %hex::encode(session.session_id()), "applied peer-proposed key rotation");
                let ack = rotation_ack_payload();
                if let Ok(frame) = crate::frame::encrypt_into_frame(
                    FrameType::Control,
                    session.session_id(),
                    CONTROL_STREAM_ID,
                    0,
                    0,
                    &ack,
                    &old_key,
                ) {
                    let _ = transport.send_to(&frame, from).await;
                }
            }
            Some(RotationMessage::Ack) => match session.take_pending_rotation_nonce() {
                Some(nonce) => {
                    if let Err(err) = session.rotate(&nonce) {
                        tracing::warn!(%from, %err, "failed to commit acknowledged rotation");
                    } else {
                        tracing::debug!(session_id = %hex::encode(session.session_id()), "committed self-proposed key rotation");
                    }
                }
                None => tracing::debug!(%from, "rotation ack with no pending request"),
            },
            None => tracing::debug!(%from, "malformed control frame"),
        }
    }

    async fn handle_stream_control_frame(&self, session: &Arc<Mutex<Session>>, parsed: &ParsedFrame<'_>) {
        let mut session = session.lock().await;
        let Ok(plaintext) = crate::frame::decrypt_parsed(parsed, session.current_key()) else {
            tracing::debug!("dropping stream-control frame: decrypt failed");
            return;
        };
        let Some(amount) = decode_credit_grant(&plaintext) else {
            tracing::debug!("malformed stream-control frame");
            return;
        };
        let Some(stream) = session.stream(parsed.stream_id) else {
            tracing::debug!(stream_id = parsed.stream_id, "credit grant for unknown stream");
            return;
        };
        stream.grant_send_credit(amount);
    }

    /// If this session's rotation policy has been crossed and this side is
    /// the handshake initiator, propose a rotation to the peer over a
    /// `CONTROL` frame. Only the initiator proposes, so the two sides can
    /// never race each other with conflicting nonces; the responder always
    /// just applies whatever nonce it is handed.
    async fn maybe_rotate(&self, transport: &Arc<dyn Transport>, peer_addr: SocketAddr, session: &mut Session) {
        if !session.is_initiator() || !session.needs_rotation() {
            return;
        }
        let mut nonce = [0u8; 32];
        if getrandom::getrandom(&mut nonce).is_err() {
            return;
        }
        if let Err(err) = session.begin_rotation(nonce.to_vec()) {
            tracing::debug!(session_id = %hex::encode(session.session_id()), %err, "rotation already pending, not issuing another request");
            return;
        }
        let request = rotation_request_payload(&nonce);
        let Ok(frame) = crate::frame::encrypt_into_frame(
            FrameType::Control,
            session.session_id(),
            CONTROL_STREAM_ID,
            0,
            0,
            &request,
            session.current_key(),
        ) else {
            return;
        };
        let _ = transport.send_to(&frame, peer_addr).await;
    }

    /// Tell the peer it may send `amount` more bytes on `stream_id`,
    /// mirroring back however much was just delivered to the application.
    async fn grant_credit(
        &self,
        transport: &Arc<dyn Transport>,
        peer_addr: SocketAddr,
        session: &mut Session,
        stream_id: u64,
        amount: u64,
    ) {
        let payload = credit_grant_payload(amount);
        let Ok(frame) = crate::frame::encrypt_into_frame(
            FrameType::StreamControl,
            session.session_id(),
            stream_id,
            0,
            0,
            &payload,
            session.current_key(),
        ) else {
            return;
        };
        let _ = transport.send_to(&frame, peer_addr).await;
    }

    /// Build and send one DATA frame for `payload` on `stream_id` within
    /// `session_id`.
    pub async fn send(&self, session_id: SessionId, stream_id: u64, payload: &[u8]) -> Result<()> {
        let transport = self.current_transport().await?;
        let peer_addr = *self
            .inner
            .session_peers
            .get(&session_id)
            .ok_or(NodeError::SessionNotFound(session_id_to_peer_key(session_id)))?;
        let session = self
            .session(session_id)
            .ok_or(NodeError::SessionNotFound(session_id_to_peer_key(session_id)))?;
        let mut session = session.lock().await;
        let Some(stream) = session.stream(stream_id) else {
            return Err(NodeError::invalid_state("unknown stream"));
        };
        // chunk_index always equals seq here because this path never segments a
        // send into multiple chunks; Stream::send advances both counters in lockstep.
        let (seq, _chunk_index, ciphertext) = stream.send(payload).map_err(crate::error::Error::from)?;
        let frame = FrameBuilder::new(FrameType::Data)
            .session_id(session_id)
            .stream_id(stream_id)
            .sequence(seq)
            .payload(ciphertext)
            .build()
            .map_err(crate::error::Error::from)?;
        let sent = frame.len() as u64;
        transport.send_to(&frame, peer_addr).await?;
        session.record_sent(sent);
        self.maybe_rotate(&transport, peer_addr, &mut session).await;
        Ok(())
    }
}

enum RotationMessage {
    Request(Vec<u8>),
    Ack,
}

fn rotation_request_payload(nonce: &[u8]) -> Vec<u8> {
    Value::Map(
        [
            ("msg_type".to_string(), Value::Text("ROTATE_REQUEST".into())),
            ("nonce".to_string(), Value::Bytes(nonce.to_vec())),
        ]
        .into_iter()
        .collect(),
    )
    .to_bytes()
}

fn rotation_ack_payload() -> Vec<u8> {
    Value::Map([("msg_type".to_string(), Value::Text("ROTATE_ACK".into()))].into_iter().collect()).to_bytes()
}

fn decode_rotation_message(bytes: &[u8]) -> Option<RotationMessage> {
    let (value, _) = Value::decode(bytes).ok()?;
    let Value::Map(map) = value else { return None };
    match map.get("msg_type") {
        Some(Value::Text(t)) if t == "ROTATE_REQUEST" => match map.get("nonce") {
            Some(Value::Bytes(b)) => Some(RotationMessage::Request(b.clone())),
            _ => None,
        },
        Some(Value::Text(t)) if t == "ROTATE_ACK" => Some(RotationMessage::Ack),
        _ => None,
    }
}

fn credit_grant_payload(amount: u64) -> Vec<u8> {
    Value::Map(
        [
            ("msg_type".to_string(), Value::Text("CREDIT".into())),
            ("credit".to_string(), Value::from_u64_fitting(amount)),
        ]
        .into_iter()
        .collect(),
    )
    .to_bytes()
}

fn decode_credit_grant(bytes: &[u8]) -> Option<u64> {
    let (value, _) = Value::decode(bytes).ok()?;
    let Value::Map(map) = value else { return None };
    match map.get("credit")? {
        Value::U8(v) => Some(u64::from(*v)),
        Value::U16(v) => Some(u64::from(*v)),
        Value::U32(v) => Some(u64::from(*v)),
        Value::U64(v) => Some(*v),
        _ => None,
    }
}

fn session_id_to_peer_key(session_id: SessionId) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&session_id);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(port: u16) -> NodeConfig {
        NodeConfig::new(
            format!("127.0.0.1:{port}").parse().unwrap(),
            b"shared_seed_32_bytes_minimum!!".to_vec(),
            [0x01; 32],
        )
    }

    #[test]
    fn node_id_is_derived_from_config() {
        let node = Node::new(test_config(0));
        assert_eq!(node.node_id().len(), 32);
    }

    #[tokio::test]
    async fn listen_addr_fails_before_start() {
        let node = Node::new(test_config(0));
        assert!(node.listen_addr().await.is_err());
    }

    #[tokio::test]
    async fn start_then_stop_round_trips_running_state() {
        let node = Node::new(test_config(0));
        node.start().await.unwrap();
        assert!(node.listen_addr().await.is_ok());
        node.stop().await.unwrap();
        assert!(node.stop().await.is_err());
    }

    #[tokio::test]
    async fn two_nodes_complete_a_handshake_over_loopback() {
        let responder = Node::new(test_config(0));
        responder.start().await.unwrap();
        let responder_addr = responder.listen_addr().await.unwrap();

        let mut initiator_config = test_config(0);
        initiator_config.node_id = [0x02; 32];
        let initiator = Node::new(initiator_config);
        initiator.start().await.unwrap();

        let session_id = initiator.connect(responder_addr, [0x01; 32]).await.unwrap();
        assert_eq!(session_id.len(), 8);
        assert_eq!(initiator.session_count(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(responder.session_count(), 1);
    }

    #[tokio::test]
    async fn accept_yields_the_same_session_id_the_initiator_receives() {
        let responder = Node::new(test_config(0));
        responder.start().await.unwrap();
        let responder_addr = responder.listen_addr().await.unwrap();

        let mut initiator_config = test_config(0);
        initiator_config.node_id = [0x02; 32];
        let initiator = Node::new(initiator_config);
        initiator.start().await.unwrap();

        let session_id = initiator.connect(responder_addr, [0x01; 32]).await.unwrap();
        let accepted = responder.accept().await.unwrap();
        assert_eq!(accepted, session_id);
    }

    #[tokio::test]
    async fn accept_hello_rejects_once_the_per_peer_pending_cap_is_reached() {
        let mut config = test_config(0);
        config.max_pending_handshakes_per_peer = 1;
        let node = Node::new(config);
        node.start().await.unwrap();
        let transport = node.current_transport().await.unwrap();

        let peer_node_id = [0x33; 32];
        let shared_seed = b"shared_seed_32_bytes_minimum!!".to_vec();

        let (_, hello1) = Handshake::initiate(peer_node_id, &shared_seed, [0x01; 32]).unwrap();
        node.accept_hello(&transport, "127.0.0.1:9001".parse().unwrap(), &hello1).await;
        assert_eq!(node.inner.handshake_registry.count_for_peer(peer_node_id), 1);

        let (_, hello2) = Handshake::initiate(peer_node_id, &shared_seed, [0x02; 32]).unwrap();
        node.accept_hello(&transport, "127.0.0.1:9002".parse().unwrap(), &hello2).await;
        assert_eq!(
            node.inner.handshake_registry.count_for_peer(peer_node_id),
            1,
            "a second concurrent hello from the same peer must be rejected once the cap is hit"
        );
    }

    #[tokio::test]
    async fn key_rotation_round_trips_between_two_live_nodes() {
        let tiny_rotation = crate::session::RotationPolicy {
            byte_threshold: 1,
            time_threshold: Duration::from_secs(3600),
            frame_threshold: 1_000_000,
            grace_window: Duration::from_secs(30),
        };

        let mut responder_config = test_config(0);
        responder_config.rotation_policy = tiny_rotation;
        let responder = Node::new(responder_config);
        responder.start().await.unwrap();
        let responder_addr = responder.listen_addr().await.unwrap();

        let mut initiator_config = test_config(0);
        initiator_config.node_id = [0x02; 32];
        initiator_config.rotation_policy = tiny_rotation;
        let initiator = Node::new(initiator_config);
        initiator.start().await.unwrap();

        let session_id = initiator.connect(responder_addr, [0x01; 32]).await.unwrap();
        let responder_session_id = responder.accept().await.unwrap();
        assert_eq!(responder_session_id, session_id);

        let key_before = {
            let session = initiator.session(session_id).unwrap();
            let mut session = session.lock().await;
            session.open_stream().unwrap();
            session.current_key().to_vec()
        };
        {
            let session = responder.session(session_id).unwrap();
            let mut session = session.lock().await;
            session.open_stream().unwrap();
        }

        initiator.send(session_id, 1, b"trigger rotation").await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let key_after_initiator = {
            let session = initiator.session(session_id).unwrap();
            let session = session.lock().await;
            session.current_key().to_vec()
        };
        let key_after_responder = {
            let session = responder.session(session_id).unwrap();
            let session = session.lock().await;
            session.current_key().to_vec()
        };

        assert_ne!(key_after_initiator, key_before);
        assert_eq!(key_after_initiator, key_after_responder);
    }

    #[tokio::test]
    async fn stream_control_frame_replenishes_send_credit_after_delivery() {
        let responder = Node::new(test_config(0));
        responder.start().await.unwrap();
        let responder_addr = responder.listen_addr().await.unwrap();

        let mut initiator_config = test_config(0);
        initiator_config.node_id = [0x02; 32];
        let initiator = Node::new(initiator_config);
        initiator.start().await.unwrap();

        let session_id = initiator.connect(responder_addr, [0x01; 32]).await.unwrap();
        let responder_session_id = responder.accept().await.unwrap();
        assert_eq!(responder_session_id, session_id);

        let credit_before = {
            let session = initiator.session(session_id).unwrap();
            let mut session = session.lock().await;
            let stream_id = session.open_stream().unwrap();
            session.stream(stream_id).unwrap().statistics().send_credit
        };
        {
            let session = responder.session(session_id).unwrap();
            let mut session = session.lock().await;
            session.open_stream().unwrap();
        }

        initiator.send(session_id, 1, b"payload").await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let credit_after = {
            let session = initiator.session(session_id).unwrap();
            let mut session = session.lock().await;
            session.stream(1).unwrap().statistics().send_credit
        };

        // The send consumed 7 bytes of credit; the responder's delivered-bytes
        // STREAM_CONTROL grant should have replenished exactly that much.
        assert_eq!(credit_after, credit_before);
    }
}
