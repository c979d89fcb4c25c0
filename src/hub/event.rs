//! Relay events
//!
//! An event is built once by the frame router, pushed onto exactly one
//! fan-out pipeline, and turned into a `ServerFrame` by that pipeline's
//! worker. Presence events carry no payload: the presence worker renders the
//! registry as it stands at delivery, so two racing snapshots can never
//! reach a session in the wrong order.

use chrono::{DateTime, FixedOffset, Utc};

use crate::protocol::ServerFrame;

/// Fan-out pipeline an event travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    /// Chat messages and join/leave announcements
    Chat,
    /// Presence snapshots
    Presence,
    /// Typing indicators
    Typing,
}

impl Pipeline {
    /// Short name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Chat => "chat",
            Pipeline::Presence => "presence",
            Pipeline::Typing => "typing",
        }
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable event published to every joined session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Chat message
    Chat {
        username: String,
        content: String,
        time: String,
    },
    /// Join / leave announcement
    System {
        username: String,
        content: String,
        time: String,
    },
    /// The set of joined sessions changed
    Presence,
    /// Typing indicator
    Typing { username: String },
}

impl RelayEvent {
    /// Announcement for a session that just joined
    pub fn joined(username: &str, time: String) -> Self {
        RelayEvent::System {
            username: username.to_string(),
            content: format!("{} joined the chat", username),
            time,
        }
    }

    /// Announcement for a session that just left
    pub fn left(username: &str, time: String) -> Self {
        RelayEvent::System {
            username: username.to_string(),
            content: format!("{} left the chat", username),
            time,
        }
    }

    /// Announcement for a session that closed without joining
    pub fn guest_left(time: String) -> Self {
        RelayEvent::System {
            username: String::new(),
            content: "a guest left the chat".to_string(),
            time,
        }
    }

    /// Pipeline this event is delivered on
    pub fn pipeline(&self) -> Pipeline {
        match self {
            RelayEvent::Chat { .. } | RelayEvent::System { .. } => Pipeline::Chat,
            RelayEvent::Presence => Pipeline::Presence,
            RelayEvent::Typing { .. } => Pipeline::Typing,
        }
    }

    /// Outbound frame for this event
    ///
    /// `users` is only read for `Presence`, which becomes a `userlist`.
    pub fn to_frame(&self, users: Vec<String>) -> ServerFrame {
        match self.clone() {
            RelayEvent::Chat {
                username,
                content,
                time,
            } => ServerFrame::Message {
                username,
                content,
                time,
            },
            RelayEvent::System {
                username,
                content,
                time,
            } => ServerFrame::System {
                username,
                content,
                time,
            },
            RelayEvent::Presence => ServerFrame::Userlist { users },
            RelayEvent::Typing { username } => ServerFrame::Typing { username },
        }
    }
}

/// Server wall clock rendering `HH:MM` at a fixed offset
///
/// Timestamps on events always come from here, never from the client.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    offset: FixedOffset,
}

impl WallClock {
    /// Create a clock for the given offset
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Current time as `HH:MM`
    pub fn now(&self) -> String {
        self.format(Utc::now())
    }

    /// Format an instant as `HH:MM` in this clock's offset
    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%H:%M").to_string()
    }
}
