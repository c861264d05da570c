//! Session identity, key rotation policy, and stream ownership.
//!
//! A session owns every stream created within it; closing a session
//! closes all of its streams. The session key is shared by all streams
//! but mutated only by [`Session::rotate`], which callers must serialize
//! against encrypt/decrypt calls (the session is not internally locked --
//! a correct caller pins one session to one task, per the cooperative
//! single-threaded-per-session model).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use strand_crypto::rotate_key;
use zeroize::Zeroizing;

use crate::error::SessionError;
use crate::handshake::{NodeId, SessionId};
use crate::stream::{Stream, CONTROL_STREAM_ID, DEFAULT_INITIAL_WINDOW};

/// Default byte threshold that triggers key rotation.
pub const DEFAULT_ROTATION_BYTES: u64 = 1024 * 1024 * 1024;
/// Default wall-clock threshold that triggers key rotation.
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(3600);
/// Default frame-count threshold that triggers key rotation.
pub const DEFAULT_ROTATION_FRAMES: u64 = 100_000;
/// Default window during which frames encrypted under the previous key
/// remain decryptable after a rotation.
pub const DEFAULT_ROTATION_GRACE: Duration = Duration::from_secs(30);
/// Default maximum number of concurrently open streams per session.
pub const DEFAULT_MAX_STREAMS: usize = 16384;

/// Key-rotation policy thresholds.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    /// Rotate once this many bytes have crossed the session since the
    /// last rotation.
    pub byte_threshold: u64,
    /// Rotate once this much wall-clock time has elapsed since the last
    /// rotation.
    pub time_threshold: Duration,
    /// Rotate once this many frames have crossed the session since the
    /// last rotation.
    pub frame_threshold: u64,
    /// How long frames encrypted under a retired key remain decryptable.
    pub grace_window: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            byte_threshold: DEFAULT_ROTATION_BYTES,
            time_threshold: DEFAULT_ROTATION_INTERVAL,
            frame_threshold: DEFAULT_ROTATION_FRAMES,
            grace_window: DEFAULT_ROTATION_GRACE,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake complete, serving streams.
    Established,
    /// Graceful shutdown in progress; no new streams may be opened.
    Closing,
    /// Fully closed; all streams dropped.
    Closed,
}

/// A session statistics snapshot, per §4.5/§6.
#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    /// Total bytes sent across all streams.
    pub bytes_sent: u64,
    /// Total bytes received across all streams.
    pub bytes_received: u64,
    /// Total frames sent.
    pub frames_sent: u64,
    /// Total frames received.
    pub frames_received: u64,
    /// Time since the session was established.
    pub age: Duration,
    /// Time since the session last saw activity.
    pub idle: Duration,
    /// Whether the session is still established.
    pub active: bool,
}

struct RetiredKey {
    key: Zeroizing<Vec<u8>>,
    retired_at: Instant,
}

/// An established session: identity, rotating key material, statistics,
/// and the streams it owns.
pub struct Session {
    session_id: SessionId,
    peer_node_id: NodeId,
    state: SessionState,
    is_initiator: bool,

    current_key: Zeroizing<Vec<u8>>,
    retired_key: Option<RetiredKey>,
    rotation_policy: RotationPolicy,
    bytes_since_rotation: u64,
    frames_since_rotation: u64,
    last_rotation: Instant,
    pending_rotation_nonce: Option<Vec<u8>>,

    streams: HashMap<u64, Stream>,
    next_stream_id: u64,
    max_streams: usize,

    bytes_sent: u64,
    bytes_received: u64,
    frames_sent: u64,
    frames_received: u64,
    created_at: Instant,
    last_activity: Instant,
}

impl Session {
    /// Construct an established session from a completed handshake's
    /// outputs. `is_initiator` records which side of the handshake this
    /// session came from: only the initiator side autonomously triggers
    /// key rotation, so the two peers never race each other proposing
    /// conflicting rotation nonces.
    #[must_use]
    pub fn new(session_id: SessionId, peer_node_id: NodeId, session_key: Zeroizing<Vec<u8>>, is_initiator: bool) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            peer_node_id,
            state: SessionState::Established,
            is_initiator,
            current_key: session_key,
            retired_key: None,
            rotation_policy: RotationPolicy::default(),
            bytes_since_rotation: 0,
            frames_since_rotation: 0,
            last_rotation: now,
            pending_rotation_nonce: None,
            streams: HashMap::new(),
            next_stream_id: 1, // stream 0 is reserved for control
            max_streams: DEFAULT_MAX_STREAMS,
            bytes_sent: 0,
            bytes_received: 0,
            frames_sent: 0,
            frames_received: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Override the rotation policy.
    #[must_use]
    pub fn with_rotation_policy(mut self, policy: RotationPolicy) -> Self {
        self.rotation_policy = policy;
        self
    }

    /// The session id. Stable for the lifetime of the session, including
    /// across key rotations.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The remote peer's node id.
    #[must_use]
    pub fn peer_node_id(&self) -> NodeId {
        self.peer_node_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether this side of the session is the handshake initiator, and
    /// therefore the side authorized to autonomously propose a key
    /// rotation.
    #[must_use]
    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    /// The key currently used for new encrypt/decrypt operations.
    #[must_use]
    pub fn current_key(&self) -> &[u8] {
        &self.current_key
    }

    /// Whether a frame encrypted under the most recently retired key
    /// would still be within the rotation grace window.
    #[must_use]
    pub fn key_for_grace_period(&self) -> Option<&[u8]> {
        self.retired_key.as_ref().and_then(|retired| {
            if retired.retired_at.elapsed() <= self.rotation_policy.grace_window {
                Some(retired.key.as_slice())
            } else {
                None
            }
        })
    }

    /// Whether any rotation threshold has been crossed.
    #[must_use]
    pub fn needs_rotation(&self) -> bool {
        self.bytes_since_rotation >= self.rotation_policy.byte_threshold
            || self.frames_since_rotation >= self.rotation_policy.frame_threshold
            || self.last_rotation.elapsed() >= self.rotation_policy.time_threshold
    }

    /// Perform a key rotation: derive a new key from the current one and
    /// a freshly exchanged `rotation_nonce`, retire the old key into the
    /// grace-window slot, and reset rotation counters.
    ///
    /// `session_id` is unaffected; it is preserved across rotations per
    /// the session-identity invariant.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionClosed`] if the session is not
    /// established.
    pub fn rotate(&mut self, rotation_nonce: &[u8]) -> Result<(), SessionError> {
        if self.state != SessionState::Established {
            return Err(SessionError::SessionClosed);
        }
        let new_key = rotate_key(&self.current_key, rotation_nonce);
        for stream in self.streams.values_mut() {
            stream.rekey(&new_key);
        }
        let old_key = std::mem::replace(&mut self.current_key, new_key);
        self.retired_key = Some(RetiredKey {
            key: old_key,
            retired_at: Instant::now(),
        });
        self.bytes_since_rotation = 0;
        self.frames_since_rotation = 0;
        self.last_rotation = Instant::now();
        Ok(())
    }

    /// Record a rotation nonce this (initiator) side has proposed to its
    /// peer, pending that peer's ack.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RotationInProgress`] if an earlier proposal
    /// is still unacknowledged.
    pub fn begin_rotation(&mut self, rotation_nonce: Vec<u8>) -> Result<(), SessionError> {
        if self.pending_rotation_nonce.is_some() {
            return Err(SessionError::RotationInProgress);
        }
        self.pending_rotation_nonce = Some(rotation_nonce);
        Ok(())
    }

    /// Take the rotation nonce this side proposed, if any is still
    /// awaiting an ack. Used to commit the rotation once the peer
    /// confirms it, or to discard it if the peer never does.
    pub fn take_pending_rotation_nonce(&mut self) -> Option<Vec<u8>> {
        self.pending_rotation_nonce.take()
    }

    /// Allocate the next stream id, monotonic and skipping
    /// [`CONTROL_STREAM_ID`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ResourceLimit`] if the session already
    /// owns `max_streams` streams.
    pub fn open_stream(&mut self) -> Result<u64, SessionError> {
        if self.state != SessionState::Established {
            return Err(SessionError::SessionClosed);
        }
        if self.streams.len() >= self.max_streams {
            return Err(SessionError::ResourceLimit);
        }
        let stream_id = self.next_stream_id;
        self.next_stream_id = self.next_stream_id.wrapping_add(1);
        if self.next_stream_id == CONTROL_STREAM_ID {
            self.next_stream_id = self.next_stream_id.wrapping_add(1);
        }
        let stream = Stream::new(stream_id, &self.current_key, DEFAULT_INITIAL_WINDOW);
        self.streams.insert(stream_id, stream);
        Ok(stream_id)
    }

    /// Borrow a stream by id.
    #[must_use]
    pub fn stream(&mut self, stream_id: u64) -> Option<&mut Stream> {
        self.streams.get_mut(&stream_id)
    }

    /// Remove and return a stream, independent of the session's own
    /// lifecycle.
    pub fn close_stream(&mut self, stream_id: u64) -> Option<Stream> {
        self.streams.remove(&stream_id)
    }

    /// Number of currently owned streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Record a send of `bytes` application payload plus one frame.
    pub fn record_sent(&mut self, bytes: u64) {
        self.bytes_sent += bytes;
        self.frames_sent += 1;
        self.bytes_since_rotation += bytes;
        self.frames_since_rotation += 1;
        self.touch();
    }

    /// Record a receive of `bytes` application payload plus one frame.
    pub fn record_received(&mut self, bytes: u64) {
        self.bytes_received += bytes;
        self.frames_received += 1;
        self.bytes_since_rotation += bytes;
        self.frames_since_rotation += 1;
        self.touch();
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Begin graceful shutdown: no further streams may be opened, but
    /// existing ones are left intact until [`Self::close`].
    pub fn begin_closing(&mut self) {
        self.state = SessionState::Closing;
    }

    /// Fully close the session, dropping all owned streams.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.streams.clear();
    }

    /// A statistics snapshot.
    #[must_use]
    pub fn statistics(&self) -> SessionStats {
        SessionStats {
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            frames_sent: self.frames_sent,
            frames_received: self.frames_received,
            age: self.created_at.elapsed(),
            idle: self.last_activity.elapsed(),
            active: self.state == SessionState::Established,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> Session {
        Session::new([7u8; 8], [9u8; 32], Zeroizing::new(vec![0x55; 32]), true)
    }

    #[test]
    fn open_stream_skips_control_id_and_is_monotonic() {
        let mut session = new_session();
        let a = session.open_stream().unwrap();
        let b = session.open_stream().unwrap();
        assert_ne!(a, CONTROL_STREAM_ID);
        assert_ne!(b, CONTROL_STREAM_ID);
        assert!(b > a);
    }

    #[test]
    fn max_streams_limit_is_enforced() {
        let mut session = new_session();
        session.max_streams = 2;
        assert!(session.open_stream().is_ok());
        assert!(session.open_stream().is_ok());
        assert!(matches!(session.open_stream(), Err(SessionError::ResourceLimit)));
    }

    #[test]
    fn rotation_preserves_session_id_and_resets_counters() {
        let mut session = new_session();
        let id_before = session.session_id();
        session.record_sent(DEFAULT_ROTATION_BYTES);
        assert!(session.needs_rotation());

        let old_key = session.current_key().to_vec();
        session.rotate(b"rotation-nonce").unwrap();

        assert_eq!(session.session_id(), id_before);
        assert_ne!(session.current_key(), old_key.as_slice());
        assert!(!session.needs_rotation());
        assert_eq!(session.key_for_grace_period(), Some(old_key.as_slice()));
    }

    #[test]
    fn rotate_is_deterministic_given_same_inputs() {
        let mut a = new_session();
        let mut b = new_session();
        a.rotate(b"same-nonce").unwrap();
        b.rotate(b"same-nonce").unwrap();
        assert_eq!(a.current_key(), b.current_key());
    }

    #[test]
    fn rotate_rekeys_open_streams_so_they_track_the_new_session_key() {
        let shared_key = Zeroizing::new(vec![0x55; 32]);
        let mut sender = Session::new([7u8; 8], [9u8; 32], shared_key.clone(), true);
        let mut receiver = Session::new([7u8; 8], [1u8; 32], shared_key, false);
        let stream_id = sender.open_stream().unwrap();
        assert_eq!(receiver.open_stream().unwrap(), stream_id);

        let (seq, chunk_index, ciphertext) = sender.stream(stream_id).unwrap().send(b"pre-rotation").unwrap();
        assert_eq!(
            receiver.stream(stream_id).unwrap().receive(seq, chunk_index, &ciphertext).unwrap(),
            vec![b"pre-rotation".to_vec()]
        );

        sender.rotate(b"rotation-nonce").unwrap();
        receiver.rotate(b"rotation-nonce").unwrap();

        // A chunk encrypted under the old per-stream subkey no longer
        // decrypts after the stream has been rekeyed.
        let (seq2, chunk2, ct2) = sender.stream(stream_id).unwrap().send(b"post-rotation").unwrap();
        assert_eq!(
            receiver.stream(stream_id).unwrap().receive(seq2, chunk2, &ct2).unwrap(),
            vec![b"post-rotation".to_vec()]
        );
    }

    #[test]
    fn begin_rotation_rejects_a_second_proposal_until_committed() {
        let mut session = new_session();
        session.begin_rotation(b"first".to_vec()).unwrap();
        assert!(matches!(
            session.begin_rotation(b"second".to_vec()),
            Err(SessionError::RotationInProgress)
        ));
        assert_eq!(session.take_pending_rotation_nonce(), Some(b"first".to_vec()));
        assert!(session.begin_rotation(b"third".to_vec()).is_ok());
    }

    #[test]
    fn close_clears_all_streams() {
        let mut session = new_session();
        session.open_stream().unwrap();
        session.open_stream().unwrap();
        assert_eq!(session.stream_count(), 2);
        session.close();
        assert_eq!(session.stream_count(), 0);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn statistics_reflect_recorded_traffic() {
        let mut session = new_session();
        session.record_sent(100);
        session.record_sent(50);
        session.record_received(25);
        let stats = session.statistics();
        assert_eq!(stats.bytes_sent, 150);
        assert_eq!(stats.bytes_received, 25);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.frames_received, 1);
        assert!(stats.active);
    }
}
