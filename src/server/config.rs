//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::hub::HubConfig;

/// Default WebSocket endpoint path
pub const DEFAULT_PATH: &str = "/ws";

/// Default plain-HTTP health check path
pub const DEFAULT_PING_PATH: &str = "/ping";

/// Origins allowed by default
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "https://chat-frontend-kappa-nine.vercel.app",
];

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Request path the WebSocket upgrade is served on
    pub path: String,

    /// Path answering `GET` with `200 pong` (None = disabled)
    pub ping_path: Option<String>,

    /// Allowed `Origin` header values (empty = allow all)
    pub allowed_origins: Vec<String>,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Frames buffered per session before fan-out starts waiting
    pub outbound_buffer: usize,

    /// WebSocket upgrade must complete within this time
    pub handshake_timeout: Duration,

    /// Time the writer gets to flush and send a close frame
    pub close_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Stats update interval
    pub stats_interval: Duration,

    /// Hub settings (cooldown, send timeout, clock)
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            path: DEFAULT_PATH.to_string(),
            ping_path: Some(DEFAULT_PING_PATH.to_string()),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|o| o.to_string())
                .collect(),
            max_connections: 0, // Unlimited
            outbound_buffer: 64,
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(1),
            tcp_nodelay: true,
            stats_interval: Duration::from_secs(30),
            hub: HubConfig::default(),
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

    /// Set the endpoint path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set or disable the health check path
    pub fn ping_path(mut self, path: Option<String>) -> Self {
        self.ping_path = path;
        self
    }

    /// Replace the origin allow-list
    pub fn allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Accept connections from any origin
    pub fn allow_any_origin(mut self) -> Self {
        self.allowed_origins.clear();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-session outbound buffer size
    pub fn outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames.max(1);
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set close timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set stats interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set the minimum interval between two chat messages of one session
    pub fn message_cooldown(mut self, cooldown: Duration) -> Self {
        self.hub = self.hub.message_cooldown(cooldown);
        self
    }

    /// Set how long fan-out waits on a full outbound buffer
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.hub = self.hub.send_timeout(timeout);
        self
    }

    /// Set the UTC offset used for `time` fields
    pub fn utc_offset(mut self, offset: FixedOffset) -> Self {
        self.hub = self.hub.utc_offset(offset);
        self
    }

    /// Check an upgrade request's `Origin` header against the allow-list
    ///
    /// A request without an `Origin` header passes only when the list is
    /// empty.
    pub fn is_origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allowed_origins.iter().any(|o| o == origin),
            None => false,
        }
    }
}
