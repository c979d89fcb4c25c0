//! Observer hooks for the relay
//!
//! Implement `RelayHandler` to watch sessions come and go (access logging,
//! auditing, custom connection admission). Every method has a default, so an
//! implementation only overrides what it needs.
//!
//! Hooks run inline on the connection task or fan-out worker that triggered
//! them and must not block.

use crate::registry::SessionId;
use crate::session::SessionContext;

/// Callbacks invoked by the hub and the connection tasks
pub trait RelayHandler: Send + Sync + 'static {
    /// Called after the WebSocket upgrade, before any frame is read
    ///
    /// Return `false` to close the connection immediately.
    fn on_connection(&self, ctx: &SessionContext) -> bool {
        let _ = ctx;
        true
    }

    /// Called once a session has claimed its display name
    fn on_join(&self, ctx: &SessionContext) {
        let _ = ctx;
    }

    /// Called when a joined session is removed from the registry
    ///
    /// Fires exactly once per join, whether the session disconnected or was
    /// evicted by a fan-out worker.
    fn on_leave(&self, session_id: SessionId, username: &str) {
        let _ = (session_id, username);
    }

    /// Called when the connection task finishes
    fn on_disconnect(&self, ctx: &SessionContext) {
        let _ = ctx;
    }
}

/// Handler that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl RelayHandler for NoopHandler {}
