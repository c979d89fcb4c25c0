//! Session state machine
//!
//! Tracks one client connection from accept to close:
//!
//! ```text
//!   Connecting ──join ok──► Joined
//!       │                     │
//!       └──── reject / ───────┴──► Closed
//!             transport close
//! ```
//!
//! `Closed` is terminal; no transition leaves it.

use std::net::SocketAddr;
use std::time::Instant;

use crate::registry::SessionId;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport accepted, no name claimed yet
    Connecting,
    /// Display name claimed and registered
    Joined,
    /// Session is finished
    Closed,
}

/// Complete per-connection state
///
/// Owned by the connection task; the registry only keeps the session's
/// outbound sender and name.
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: SessionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// `Origin` header from the upgrade request, if any
    pub origin: Option<String>,

    /// Current phase
    pub phase: SessionPhase,

    /// Normalized display name, set on join
    pub display_name: Option<String>,

    /// Time of the last accepted chat message (cooldown tracking)
    pub last_message_at: Option<tokio::time::Instant>,

    /// Connection start time
    pub connected_at: Instant,

    /// Time when the session joined
    pub joined_at: Option<Instant>,

    /// Chat messages accepted from this session
    pub messages_sent: u64,
}

impl SessionState {
    /// Create a new session in the `Connecting` phase
    pub fn new(id: SessionId, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            origin: None,
            phase: SessionPhase::Connecting,
            display_name: None,
            last_message_at: None,
            connected_at: Instant::now(),
            joined_at: None,
            messages_sent: 0,
        }
    }

    /// Record the request origin
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    /// Promote to `Joined` under the given (already registered) name
    ///
    /// Has no effect unless the session is still connecting.
    pub fn on_join(&mut self, name: String) {
        if self.phase == SessionPhase::Connecting {
            self.display_name = Some(name);
            self.joined_at = Some(Instant::now());
            self.phase = SessionPhase::Joined;
        }
    }

    /// Move to the terminal `Closed` phase
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Check if the session has joined
    pub fn is_joined(&self) -> bool {
        self.phase == SessionPhase::Joined
    }

    /// Check if the session is closed
    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Display name, if the session ever joined
    pub fn username(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
