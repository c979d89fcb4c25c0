//! Wire frames
//!
//! Every WebSocket text message carries exactly one JSON object tagged by its
//! `type` field:
//!
//! ```text
//! Client -> Server
//!   {"type":"join","username":..}
//!   {"type":"typing"}
//!   {"type":"message","content":..}
//!
//! Server -> Client
//!   {"type":"message","username":..,"content":..,"time":"HH:MM"}
//!   {"type":"system", ...same fields...}
//!   {"type":"userlist","users":[..]}
//!   {"type":"typing","username":..}
//!   {"type":"error","error":<code>,"content":..}
//! ```
//!
//! Outbound frames are encoded once per published event and the resulting
//! `Utf8Bytes` is reference counted, so fan-out to N sessions shares a single
//! allocation.

use serde::{Deserialize, Deserializer, Serialize};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

use crate::error::{CodecError, Result};

/// Frame received from a client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Claim a display name
    Join {
        #[serde(default, deserialize_with = "lenient_string")]
        username: String,
    },
    /// Typing indicator
    Typing,
    /// Chat message
    Message {
        #[serde(default, deserialize_with = "lenient_string")]
        content: String,
    },
    /// Any `type` this server does not understand
    #[serde(other)]
    Unknown,
}

/// Read a string field, treating any other JSON value as empty
///
/// A `join` with a numeric username then fails name validation instead of
/// the whole frame failing to decode.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        _ => Ok(String::new()),
    }
}

impl ClientFrame {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Join { .. } => "join",
            ClientFrame::Typing => "typing",
            ClientFrame::Message { .. } => "message",
            ClientFrame::Unknown => "unknown",
        }
    }
}

/// Error codes reported in `error` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame other than `join` before the session joined
    Unauthorized,
    /// Username failed syntactic validation
    InvalidUsername,
    /// Username is held by another live session
    UsernameTaken,
    /// Message content empty or too long
    InvalidMessage,
    /// Message sent before the cooldown elapsed
    Cooldown,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::InvalidUsername => "invalid_username",
            ErrorCode::UsernameTaken => "username_taken",
            ErrorCode::InvalidMessage => "invalid_message",
            ErrorCode::Cooldown => "cooldown",
        }
    }

    /// Human readable explanation sent alongside the code
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Join the chat before sending anything else.",
            ErrorCode::InvalidUsername => {
                "Invalid username. Use 1 to 20 letters and digits only."
            }
            ErrorCode::UsernameTaken => "This username is already in use.",
            ErrorCode::InvalidMessage => "Invalid message.",
            ErrorCode::Cooldown => "Please slow down.",
        }
    }

    /// Whether the connection is closed after reporting this error
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ErrorCode::Unauthorized | ErrorCode::InvalidUsername | ErrorCode::UsernameTaken
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame sent to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Chat message from a joined user
    Message {
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
    /// Presence snapshot
    Userlist { users: Vec<String> },
    /// Typing indicator
    Typing { username: String },
    /// Rejection reported to the offending session only
    Error { error: ErrorCode, content: String },
}

impl ServerFrame {
    /// Build an error frame with the standard message for `code`
    pub fn error(code: ErrorCode) -> Self {
        ServerFrame::Error {
            error: code,
            content: code.message().to_string(),
        }
    }
}

/// An encoded outbound frame, cheap to clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame(Utf8Bytes);

impl EncodedFrame {
    /// Encoded JSON text
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Convert into a WebSocket text message
    pub fn into_message(self) -> Message {
        Message::Text(self.0)
    }
}

/// Encode a server frame to JSON text
pub fn encode(frame: &ServerFrame) -> Result<EncodedFrame> {
    let json = serde_json::to_string(frame)?;
    Ok(EncodedFrame(Utf8Bytes::from(json)))
}

/// Decode a client frame from JSON text
pub fn decode(text: &str) -> Result<ClientFrame> {
    serde_json::from_str(text).map_err(|e| CodecError::Json(e).into())
}
