//! Multiplexed, ordered byte streams within a session.
//!
//! A stream owns its own crypto isolation context (so nonces/chunk indices
//! never collide with another stream under the same session key), its own
//! sequence counters, and a bounded out-of-order reassembly buffer.
//! Ordering guarantees are per-stream only: bytes delivered to the
//! application are exactly the bytes the peer sent, in order, without
//! duplication or gaps; no ordering is implied across streams.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use strand_crypto::StreamCrypto;

use crate::error::{Error, StreamError};

/// Stream id 0 is reserved for session control traffic.
pub const CONTROL_STREAM_ID: u64 = 0;

/// Default bound on a stream's out-of-order reassembly buffer.
pub const DEFAULT_MAX_REORDER_BUFFER_BYTES: usize = 1024 * 1024;

/// Default initial send credit (and therefore also the receive window we
/// advertise to a peer that mirrors our defaults).
pub const DEFAULT_INITIAL_WINDOW: u64 = 1024 * 1024;

/// Default idle threshold before a stream is considered expired.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting sends and receives.
    Open,
    /// Closed by either side; no further sends or receives.
    Closed,
    /// Expired due to inactivity beyond the idle threshold.
    Expired,
}

/// A stream statistics snapshot.
#[derive(Debug, Clone, Copy)]
pub struct StreamStats {
    /// Current lifecycle state.
    pub state: StreamState,
    /// Total application bytes sent.
    pub bytes_sent: u64,
    /// Total application bytes delivered to the application.
    pub bytes_received: u64,
    /// Remaining outbound send credit.
    pub send_credit: u64,
    /// Time since the stream was created.
    pub age: Duration,
    /// Time since the stream last saw activity.
    pub idle: Duration,
}

/// A single multiplexed stream.
pub struct Stream {
    stream_id: u64,
    crypto: StreamCrypto,
    state: StreamState,

    next_send_seq: u64,
    next_chunk_index: u64,
    send_credit: u64,

    next_expected_recv_seq: u64,
    reorder_buffer: BTreeMap<u64, Vec<u8>>,
    reorder_buffer_bytes: usize,
    max_reorder_buffer_bytes: usize,

    bytes_sent: u64,
    bytes_received: u64,

    created_at: Instant,
    last_activity: Instant,
    idle_timeout: Duration,
}

impl Stream {
    /// Create a new stream, deriving its crypto isolation context from the
    /// session key.
    #[must_use]
    pub fn new(stream_id: u64, session_key: &[u8], initial_window: u64) -> Self {
        let now = Instant::now();
        Self {
            stream_id,
            crypto: StreamCrypto::new(session_key, stream_id),
            state: StreamState::Open,
            next_send_seq: 0,
            next_chunk_index: 0,
            send_credit: initial_window,
            next_expected_recv_seq: 0,
            reorder_buffer: BTreeMap::new(),
            reorder_buffer_bytes: 0,
            max_reorder_buffer_bytes: DEFAULT_MAX_REORDER_BUFFER_BYTES,
            bytes_sent: 0,
            bytes_received: 0,
            created_at: now,
            last_activity: now,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Override the out-of-order buffer bound.
    #[must_use]
    pub fn with_max_reorder_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_reorder_buffer_bytes = bytes;
        self
    }

    /// Override the idle-expiry threshold.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// This stream's id.
    #[must_use]
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Current lifecycle state, refreshing idle-expiry first.
    #[must_use]
    pub fn state(&mut self) -> StreamState {
        self.refresh_expiry();
        self.state
    }

    fn refresh_expiry(&mut self) {
        if self.state == StreamState::Open && self.last_activity.elapsed() >= self.idle_timeout {
            self.state = StreamState::Expired;
        }
    }

    fn ensure_open(&mut self) -> Result<(), StreamError> {
        match self.state() {
            StreamState::Open => Ok(()),
            StreamState::Expired => Err(StreamError::StreamExpired),
            StreamState::Closed => Err(StreamError::StreamClosed),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Grant additional outbound send credit, e.g. on an inbound
    /// `STREAM_CONTROL` frame from the peer.
    pub fn grant_send_credit(&mut self, amount: u64) {
        self.send_credit = self.send_credit.saturating_add(amount);
    }

    /// Re-derive this stream's crypto isolation context from a rotated
    /// session key, e.g. after [`crate::session::Session::rotate`].
    /// Sequence counters, credit, and the reorder buffer are untouched --
    /// only the key material changes.
    pub fn rekey(&mut self, session_key: &[u8]) {
        self.crypto = StreamCrypto::new(session_key, self.stream_id);
    }

    /// Encrypt and sequence one outbound chunk.
    ///
    /// This call is synchronous and performs no suspension internally, so
    /// a cancelled caller never observes a sequence number that was
    /// reserved but not actually committed: either this returns with the
    /// counters advanced, or it returns an error and nothing changed.
    ///
    /// Returns `(sequence, chunk_index, ciphertext)`, ready to be bound
    /// into a frame by the caller (which owns the session id).
    pub fn send(&mut self, payload: &[u8]) -> Result<(u64, u64, Vec<u8>), Error> {
        self.ensure_open()?;
        if self.next_send_seq == u64::MAX {
            return Err(StreamError::SequenceOverflow.into());
        }
        let needed = payload.len() as u64;
        if needed > self.send_credit {
            return Err(StreamError::WindowExceeded.into());
        }

        let seq = self.next_send_seq;
        let chunk_index = self.next_chunk_index;
        let ciphertext = self.crypto.encrypt_chunk(payload, chunk_index)?;

        self.next_send_seq += 1;
        self.next_chunk_index += 1;
        self.send_credit -= needed;
        self.bytes_sent += needed;
        self.touch();

        Ok((seq, chunk_index, ciphertext))
    }

    /// Handle one inbound chunk for this stream.
    ///
    /// If `seq` is the next expected sequence, returns the newly
    /// deliverable plaintexts in order (this chunk plus any now-contiguous
    /// buffered ones). If `seq` is ahead of expectations, the chunk is
    /// decrypted and buffered, bounded by the out-of-order window; an
    /// over-full buffer fails with [`StreamError::WindowExceeded`]. If
    /// `seq` is behind expectations, it is a duplicate.
    pub fn receive(&mut self, seq: u64, chunk_index: u64, ciphertext: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        self.ensure_open()?;
        if seq < self.next_expected_recv_seq {
            return Err(StreamError::DuplicateSequence.into());
        }

        let plaintext = self.crypto.decrypt_chunk(ciphertext, chunk_index)?;

        if seq == self.next_expected_recv_seq {
            let mut delivered = vec![plaintext];
            self.next_expected_recv_seq += 1;
            while let Some(buffered) = self.reorder_buffer.remove(&self.next_expected_recv_seq) {
                self.reorder_buffer_bytes -= buffered.len();
                delivered.push(buffered);
                self.next_expected_recv_seq += 1;
            }
            self.bytes_received += delivered.iter().map(|b| b.len() as u64).sum::<u64>();
            self.touch();
            Ok(delivered)
        } else {
            if self.reorder_buffer_bytes + plaintext.len() > self.max_reorder_buffer_bytes {
                return Err(StreamError::WindowExceeded.into());
            }
            self.reorder_buffer_bytes += plaintext.len();
            self.reorder_buffer.insert(seq, plaintext);
            self.touch();
            Ok(Vec::new())
        }
    }

    /// Close the stream. Independent of the owning session's lifecycle.
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }

    /// A statistics snapshot.
    #[must_use]
    pub fn statistics(&self) -> StreamStats {
        StreamStats {
            state: self.state,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            send_credit: self.send_credit,
            age: self.created_at.elapsed(),
            idle: self.last_activity.elapsed(),
        }
    }
}
