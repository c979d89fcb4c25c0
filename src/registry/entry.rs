//! Registry entry types
//!
//! The registry never owns a session; it holds the session's outbound
//! sender and the name it joined under.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Notify};

use crate::protocol::EncodedFrame;

/// Opaque per-connection handle
///
/// Allocated from a monotonic counter, so a handle is never reused after its
/// connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw handle value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounded queue feeding a session's socket writer
pub type SessionSender = mpsc::Sender<EncodedFrame>;

/// Send side of a session, shared between its connection task and the
/// fan-out workers
///
/// Besides the outbound queue it carries a kick signal: a fan-out worker that
/// evicts the session uses it to tell the connection task to stop reading.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Outbound queue of the session
    pub sender: SessionSender,
    kicked: Arc<Notify>,
}

impl SessionHandle {
    /// Wrap a session's outbound queue
    pub fn new(sender: SessionSender) -> Self {
        Self {
            sender,
            kicked: Arc::new(Notify::new()),
        }
    }

    /// Ask the owning connection task to close
    ///
    /// The signal is latched, so a connection that is not currently waiting
    /// still observes it on its next wait.
    pub fn kick(&self) {
        self.kicked.notify_one();
    }

    /// Resolves once the session has been kicked
    pub async fn kicked(&self) {
        self.kicked.notified().await;
    }
}

/// A joined session as seen by the registry
#[derive(Debug, Clone)]
pub struct Member {
    /// Normalized display name
    pub name: String,

    /// Send side of the session
    pub handle: SessionHandle,

    /// When the join committed
    pub joined_at: Instant,
}

impl Member {
    pub(super) fn new(name: String, handle: SessionHandle) -> Self {
        Self {
            name,
            handle,
            joined_at: Instant::now(),
        }
    }
}
