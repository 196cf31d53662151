//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Default WebSocket endpoint path
pub const DEFAULT_ENDPOINT: &str = "/ws/screen";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Path clients must request for the WebSocket upgrade
    pub endpoint: String,

    /// Messages buffered per subscriber before it is dropped as too slow
    pub outbound_queue: usize,

    /// Connection timeout (handshake must complete within this time)
    pub handshake_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            endpoint: DEFAULT_ENDPOINT.to_string(),
            outbound_queue: 32,
            handshake_timeout: Duration::from_secs(10),
            tcp_nodelay: true, // Frames are latency sensitive
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the WebSocket endpoint path
    pub fn endpoint(mut self, path: impl Into<String>) -> Self {
        self.endpoint = path.into();
        self
    }

    /// Set the per-subscriber queue length (minimum 1)
    pub fn outbound_queue(mut self, len: usize) -> Self {
        self.outbound_queue = len.max(1);
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}
