//! Chat wire protocol
//!
//! JSON frames exchanged over WebSocket text messages, plus the limits
//! applied to usernames and chat content.

pub mod frame;
pub mod limits;

pub use frame::{decode, encode, ClientFrame, EncodedFrame, ErrorCode, ServerFrame};
pub use limits::{is_valid_content, normalize_username, MAX_CONTENT_CHARS, MAX_USERNAME_CHARS};
