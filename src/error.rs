//! Error types
//!
//! Crate-wide error and result types. Application-level rejections that are
//! reported to the client (bad username, cooldown, ...) are not errors here;
//! they travel as `error` frames. This type covers the failures that end a
//! connection or stop the server.

use tokio_tungstenite::tungstenite;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Debug)]
pub enum Error {
    /// Socket level I/O failure (bind, accept, configure)
    Io(std::io::Error),
    /// WebSocket handshake or framing failure
    WebSocket(tungstenite::Error),
    /// Frame could not be encoded or decoded
    Codec(CodecError),
}

/// Wire codec failures
#[derive(Debug)]
pub enum CodecError {
    /// Payload is not a valid JSON frame
    Json(serde_json::Error),
    /// Transport delivered a frame type that carries no JSON text
    NotText,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
        }
    }
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Json(e) => write!(f, "invalid JSON frame: {}", e),
            CodecError::NotText => write!(f, "expected a text frame"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Codec(CodecError::Json(e)) => Some(e),
            Error::Codec(CodecError::NotText) => None,
        }
    }
}

impl std::error::Error for CodecError {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(CodecError::Json(e))
    }
}
