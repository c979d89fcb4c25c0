//! Statistics for the relay hub
//!
//! Lock-free counters updated by connection tasks and fan-out workers.
//! `snapshot()` copies them into a plain struct for logging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Hub-wide counters
#[derive(Debug)]
pub struct HubStats {
    started_at: Instant,
    connections: AtomicU64,
    active_connections: AtomicU64,
    joins: AtomicU64,
    join_rejections: AtomicU64,
    departures: AtomicU64,
    evictions: AtomicU64,
    chat_messages: AtomicU64,
    system_messages: AtomicU64,
    presence_updates: AtomicU64,
    typing_events: AtomicU64,
    cooldown_rejections: AtomicU64,
    invalid_messages: AtomicU64,
    unauthorized_frames: AtomicU64,
    frames_delivered: AtomicU64,
}

/// Point-in-time copy of the hub counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Time since the hub started
    pub uptime: Duration,
    /// Total connections accepted
    pub connections: u64,
    /// Connections currently open
    pub active_connections: u64,
    /// Successful joins
    pub joins: u64,
    /// Joins refused (invalid or taken name)
    pub join_rejections: u64,
    /// Joined sessions that left, for any reason
    pub departures: u64,
    /// Sessions removed after a failed send
    pub evictions: u64,
    /// Chat messages published
    pub chat_messages: u64,
    /// Join/leave announcements published
    pub system_messages: u64,
    /// Presence snapshots published
    pub presence_updates: u64,
    /// Typing indicators published
    pub typing_events: u64,
    /// Messages dropped by the cooldown
    pub cooldown_rejections: u64,
    /// Messages rejected for empty or oversized content
    pub invalid_messages: u64,
    /// Frames sent before joining
    pub unauthorized_frames: u64,
    /// Frames handed to session outbound buffers by fan-out workers
    pub frames_delivered: u64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        #[doc = concat!("Increment `", stringify!($field), "`")]
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl HubStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            joins: AtomicU64::new(0),
            join_rejections: AtomicU64::new(0),
            departures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            chat_messages: AtomicU64::new(0),
            system_messages: AtomicU64::new(0),
            presence_updates: AtomicU64::new(0),
            typing_events: AtomicU64::new(0),
            cooldown_rejections: AtomicU64::new(0),
            invalid_messages: AtomicU64::new(0),
            unauthorized_frames: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
        }
    }

    /// Record an accepted connection
    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed connection
    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    counter!(record_join, joins);
    counter!(record_join_rejection, join_rejections);
    counter!(record_departure, departures);
    counter!(record_eviction, evictions);
    counter!(record_chat, chat_messages);
    counter!(record_system, system_messages);
    counter!(record_presence, presence_updates);
    counter!(record_typing, typing_events);
    counter!(record_cooldown, cooldown_rejections);
    counter!(record_invalid_message, invalid_messages);
    counter!(record_unauthorized, unauthorized_frames);

    /// Add to the delivered frame count
    pub fn record_delivered(&self, frames: u64) {
        self.frames_delivered.fetch_add(frames, Ordering::Relaxed);
    }

    /// Copy the current counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            connections: load(&self.connections),
            active_connections: load(&self.active_connections),
            joins: load(&self.joins),
            join_rejections: load(&self.join_rejections),
            departures: load(&self.departures),
            evictions: load(&self.evictions),
            chat_messages: load(&self.chat_messages),
            system_messages: load(&self.system_messages),
            presence_updates: load(&self.presence_updates),
            typing_events: load(&self.typing_events),
            cooldown_rejections: load(&self.cooldown_rejections),
            invalid_messages: load(&self.invalid_messages),
            unauthorized_frames: load(&self.unauthorized_frames),
            frames_delivered: load(&self.frames_delivered),
        }
    }
}

impl Default for HubStats {
    fn default() -> Self {
        Self::new()
    }
}
