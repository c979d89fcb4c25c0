//! Hub configuration

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::session::DEFAULT_MESSAGE_COOLDOWN;

/// Default UTC offset for message timestamps (UTC+3)
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Minimum gap between two accepted chat messages from one session
    pub message_cooldown: Duration,

    /// How long a fan-out worker waits on one session's full outbound
    /// buffer before evicting it
    pub send_timeout: Duration,

    /// Offset used to render `HH:MM` timestamps
    pub utc_offset: FixedOffset,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            message_cooldown: DEFAULT_MESSAGE_COOLDOWN,
            send_timeout: Duration::from_secs(2),
            utc_offset: default_offset(),
        }
    }
}

impl HubConfig {
    /// Set the message cooldown
    pub fn message_cooldown(mut self, cooldown: Duration) -> Self {
        self.message_cooldown = cooldown;
        self
    }

    /// Set the per-session send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the timestamp offset
    pub fn utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}
