//! Per-session message cooldown
//!
//! A chat message is accepted only if at least `interval` has passed since
//! the previous accepted message from the same session. There is no burst
//! allowance and no escalation: a rejected message is simply dropped.

use std::time::Duration;

use tokio::time::Instant;

use super::state::SessionState;

/// Default minimum gap between two accepted messages
pub const DEFAULT_MESSAGE_COOLDOWN: Duration = Duration::from_secs(1);

/// Outcome of a cooldown check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    /// Message may be published; the timestamp was recorded
    Allowed,
    /// Message must be dropped
    Rejected {
        /// Time left until the next message would be accepted
        remaining: Duration,
    },
}

impl CooldownCheck {
    /// Check if the message was allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, CooldownCheck::Allowed)
    }
}

/// Fixed-interval rate limiter
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    interval: Duration,
}

impl Cooldown {
    /// Create a limiter with the given interval
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Check the session against the current time, recording it on success
    pub fn check_and_record(&self, session: &mut SessionState) -> CooldownCheck {
        self.check_at(&mut session.last_message_at, Instant::now())
    }

    /// Check `last` against `now`, recording `now` on success
    pub fn check_at(&self, last: &mut Option<Instant>, now: Instant) -> CooldownCheck {
        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.interval {
                return CooldownCheck::Rejected {
                    remaining: self.interval - elapsed,
                };
            }
        }

        *last = Some(now);
        CooldownCheck::Allowed
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_COOLDOWN)
    }
}
