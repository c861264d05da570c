//! Transport factory for creating transport instances.
//!
//! This module provides a factory pattern for creating a transport from
//! configuration, so callers don't have to depend on a concrete transport
//! type.

use crate::transport::{Transport, TransportResult};
use crate::udp_async::AsyncUdpTransport;
use std::net::SocketAddr;
use std::sync::Arc;

/// Transport type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    /// UDP transport (the only backend STRAND ships today).
    #[default]
    Udp,
}

/// Configuration for creating a transport.
#[derive(Debug, Clone)]
pub struct TransportFactoryConfig {
    /// Type of transport to create
    pub transport_type: TransportType,
    /// Local address to bind to
    pub bind_addr: SocketAddr,
    /// Receive buffer size (bytes)
    pub recv_buffer_size: Option<usize>,
    /// Send buffer size (bytes)
    pub send_buffer_size: Option<usize>,
}

impl TransportFactoryConfig {
    /// Create a new transport configuration.
    ///
    /// # Arguments
    /// * `transport_type` - The type of transport to create
    /// * `bind_addr` - The local address to bind to
    ///
    /// # Examples
    /// ```no_run
    /// use strand_transport::factory::{TransportFactoryConfig, TransportType};
    /// use std::net::SocketAddr;
    ///
    /// let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    /// let config = TransportFactoryConfig::new(TransportType::Udp, addr);
    /// ```
    #[must_use]
    pub fn new(transport_type: TransportType, bind_addr: SocketAddr) -> Self {
        Self {
            transport_type,
            bind_addr,
            recv_buffer_size: None,
            send_buffer_size: None,
        }
    }

    /// Create a UDP transport configuration.
    ///
    /// # Arguments
    /// * `bind_addr` - The local address to bind to
    ///
    /// # Examples
    /// ```no_run
    /// use strand_transport::factory::TransportFactoryConfig;
    /// use std::net::SocketAddr;
    ///
    /// let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    /// let config = TransportFactoryConfig::udp(addr);
    /// ```
    #[must_use]
    pub fn udp(bind_addr: SocketAddr) -> Self {
        Self::new(TransportType::Udp, bind_addr)
    }

    /// Set custom buffer sizes.
    ///
    /// # Arguments
    /// * `recv_size` - Receive buffer size in bytes
    /// * `send_size` - Send buffer size in bytes
    #[must_use]
    pub fn with_buffer_sizes(mut self, recv_size: usize, send_size: usize) -> Self {
        self.recv_buffer_size = Some(recv_size);
        self.send_buffer_size = Some(send_size);
        self
    }
}

/// Default bind address for transports (0.0.0.0:0 = any interface, OS-assigned port)
const DEFAULT_BIND_ADDR: std::net::SocketAddr = std::net::SocketAddr::V4(
    std::net::SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0),
);

impl Default for TransportFactoryConfig {
    fn default() -> Self {
        Self {
            transport_type: TransportType::Udp,
            bind_addr: DEFAULT_BIND_ADDR,
            recv_buffer_size: None,
            send_buffer_size: None,
        }
    }
}

/// Factory for creating transport instances.
///
/// This factory provides a unified interface for creating different transport
/// implementations based on configuration.
///
/// # Examples
///
/// ```no_run
/// use strand_transport::factory::{TransportFactory, TransportFactoryConfig, TransportType};
/// use std::net::SocketAddr;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let addr: SocketAddr = "127.0.0.1:40000".parse()?;
/// let config = TransportFactoryConfig::udp(addr);
///
/// let transport = TransportFactory::create(config).await?;
/// println!("Created transport on {}", transport.local_addr()?);
/// # Ok(())
/// # }
/// ```
pub struct TransportFactory;

impl TransportFactory {
    /// Create a transport based on the provided configuration.
    ///
    /// # Arguments
    /// * `config` - Transport configuration
    ///
    /// # Returns
    /// A boxed transport implementing the `Transport` trait
    ///
    /// # Errors
    /// Returns `TransportError` if transport creation fails
    ///
    /// # Examples
    /// ```no_run
    /// use strand_transport::factory::{TransportFactory, TransportFactoryConfig};
    /// use std::net::SocketAddr;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let addr: SocketAddr = "127.0.0.1:0".parse()?;
    /// let config = TransportFactoryConfig::udp(addr);
    /// let transport = TransportFactory::create(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create(config: TransportFactoryConfig) -> TransportResult<Arc<dyn Transport>> {
        match config.transport_type {
            TransportType::Udp => {
                let transport = AsyncUdpTransport::bind(config.bind_addr).await?;
                Ok(Arc::new(transport))
            }
        }
    }

    /// Create a UDP transport with default settings.
    ///
    /// # Arguments
    /// * `bind_addr` - The local address to bind to
    ///
    /// # Errors
    /// Returns `TransportError` if binding fails
    ///
    /// # Examples
    /// ```no_run
    /// use strand_transport::factory::TransportFactory;
    /// use std::net::SocketAddr;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let addr: SocketAddr = "127.0.0.1:0".parse()?;
    /// let transport = TransportFactory::create_udp(addr).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_udp(bind_addr: SocketAddr) -> TransportResult<Arc<dyn Transport>> {
        let config = TransportFactoryConfig::udp(bind_addr);
        Self::create(config).await
    }

    /// Get list of available transport types.
    ///
    /// # Returns
    /// Vector of transport types that can be created
    #[must_use]
    pub fn available_transports() -> Vec<TransportType> {
        vec![TransportType::Udp]
    }

    /// Check if a transport type is fully implemented.
    ///
    /// # Arguments
    /// * `transport_type` - The transport type to check
    ///
    /// # Returns
    /// `true` if the transport is fully implemented and functional
    #[must_use]
    pub fn is_implemented(transport_type: TransportType) -> bool {
        matches!(transport_type, TransportType::Udp)
    }
}
