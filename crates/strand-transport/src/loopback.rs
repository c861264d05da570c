//! In-process loopback transport.
//!
//! Delivers datagrams via channels instead of a socket, so handshake and
//! stream integration tests can drive a full peer exchange deterministically
//! without touching the network.

use crate::transport::{Transport, TransportError, TransportResult, TransportStats};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, Mutex};

type Registry = DashMap<SocketAddr, mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

static NEXT_PORT: AtomicU16 = AtomicU16::new(1);

/// An in-process transport backed by channels rather than a real socket.
///
/// Every instance registers its assigned address in a process-wide table;
/// `send_to` looks up the destination's sender in that table. Two
/// [`LoopbackTransport`]s in the same process can exchange frames exactly as
/// two [`crate::udp_async::AsyncUdpTransport`]s over real loopback would,
/// minus the kernel round trip.
#[derive(Clone)]
pub struct LoopbackTransport {
    local_addr: SocketAddr,
    inbox: Arc<Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>>,
    closed: Arc<AtomicBool>,
    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    packets_sent: Arc<AtomicU64>,
    packets_received: Arc<AtomicU64>,
    send_errors: Arc<AtomicU64>,
    recv_errors: Arc<AtomicU64>,
}

impl LoopbackTransport {
    /// Bind a new loopback transport under a freshly allocated synthetic
    /// address (`127.0.0.1:<n>`), so concurrent tests never collide.
    #[must_use]
    pub fn bind() -> Self {
        let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
        let local_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let (tx, rx) = mpsc::unbounded_channel();
        registry().insert(local_addr, tx);
        Self {
            local_addr,
            inbox: Arc::new(Mutex::new(rx)),
            closed: Arc::new(AtomicBool::new(false)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            packets_sent: Arc::new(AtomicU64::new(0)),
            packets_received: Arc::new(AtomicU64::new(0)),
            send_errors: Arc::new(AtomicU64::new(0)),
            recv_errors: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }

        let Some(dest) = registry().get(&addr) else {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::ConnectionFailed(format!(
                "no loopback transport bound at {addr}"
            )));
        };

        if dest.send((buf.to_vec(), self.local_addr)).is_err() {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::ConnectionFailed(format!(
                "peer at {addr} has disconnected"
            )));
        }

        self.bytes_sent
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }

        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some((data, from)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                self.packets_received.fetch_add(1, Ordering::Relaxed);
                Ok((n, from))
            }
            None => {
                self.recv_errors.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Closed)
            }
        }
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::Relaxed);
        registry().remove(&self.local_addr);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
        }
    }
}
