//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default send window, roughly four full-size TCP segments
pub const DEFAULT_SEND_WINDOW: usize = 5744;

/// Shortest idle poll interval the server will tick at
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default limit for a request head
pub const DEFAULT_MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Bytes a connection may have in flight before `space()` reports 0
    pub send_window: usize,

    /// Interval between idle polls of every session
    pub poll_interval: Duration,

    /// A single write stalled this long times the client out
    pub ack_timeout: Duration,

    /// Request head must arrive within this time
    pub request_timeout: Duration,

    /// Largest accepted request head in bytes
    pub max_request_head: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            max_connections: 0, // Unlimited
            send_window: DEFAULT_SEND_WINDOW,
            poll_interval: Duration::from_millis(500),
            ack_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(10),
            max_request_head: DEFAULT_MAX_REQUEST_HEAD,
            tcp_nodelay: true, // Events are small and latency sensitive
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

    /// Set the per-connection send window (at least 1 byte)
    pub fn send_window(mut self, bytes: usize) -> Self {
        self.send_window = bytes.max(1);
        self
    }

    /// Set the idle poll interval (at least [`MIN_POLL_INTERVAL`])
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Set the write stall timeout
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the request head timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the request head size limit
    pub fn max_request_head(mut self, bytes: usize) -> Self {
        self.max_request_head = bytes;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}
