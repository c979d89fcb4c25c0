//! Handler context
//!
//! Read-only snapshot of session information handed to `RelayHandler`
//! callbacks.

use std::net::SocketAddr;

use crate::registry::SessionId;

use super::state::{SessionPhase, SessionState};

/// Context passed to RelayHandler callbacks
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: SessionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// `Origin` header from the upgrade request, if any
    pub origin: Option<String>,

    /// Display name (after join)
    pub username: Option<String>,

    /// Phase at the time the context was taken
    pub phase: SessionPhase,
}

impl SessionContext {
    /// Build a context from the current session state
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            session_id: state.id,
            peer_addr: state.peer_addr,
            origin: state.origin.clone(),
            username: state.display_name.clone(),
            phase: state.phase,
        }
    }
}
