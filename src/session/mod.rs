//! Per-connection session state
//!
//! Each accepted connection owns one `SessionState`. The cooldown limiter
//! lives here as well because its only state is the session's
//! `last_message_at` timestamp.

pub mod context;
pub mod cooldown;
pub mod state;

pub use context::SessionContext;
pub use cooldown::{Cooldown, CooldownCheck, DEFAULT_MESSAGE_COOLDOWN};
pub use state::{SessionPhase, SessionState};
