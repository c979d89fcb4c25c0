//! Registry error types
//!
//! Error types for session registry operations.

use crate::protocol::ErrorCode;

use super::entry::SessionId;

/// Reason a join was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// Name is empty, too long, or not alphanumeric (carries the raw input)
    InvalidUsername(String),
    /// Name is held by another live session (carries the normalized name)
    UsernameTaken(String),
    /// Session is already registered under a name
    AlreadyJoined(SessionId),
}

impl JoinError {
    /// Error code reported to the client
    pub fn code(&self) -> ErrorCode {
        match self {
            JoinError::InvalidUsername(_) | JoinError::AlreadyJoined(_) => {
                ErrorCode::InvalidUsername
            }
            JoinError::UsernameTaken(_) => ErrorCode::UsernameTaken,
        }
    }
}

impl std::fmt::Display for JoinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinError::InvalidUsername(raw) => write!(f, "invalid username: {:?}", raw),
            JoinError::UsernameTaken(name) => write!(f, "username already taken: {}", name),
            JoinError::AlreadyJoined(id) => write!(f, "session {} already joined", id),
        }
    }
}

impl std::error::Error for JoinError {}
