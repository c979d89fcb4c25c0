//! Real-time chat relay over WebSocket
//!
//! Clients connect, claim a unique display name and then exchange chat
//! messages, typing indicators and presence updates with every other joined
//! client.
//!
//! # Example
//!
//! ```no_run
//! use chat_relay::{NoopHandler, RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> chat_relay::Result<()> {
//!     let config = ServerConfig::default();
//!     let server = RelayServer::new(config, NoopHandler);
//!     server.run().await
//! }
//! ```
//!
//! # Protocol
//!
//! All frames are JSON text messages tagged by `type`:
//!
//! ```text
//!   client → server   join {username} | message {content} | typing
//!   server → client   message | system | userlist | typing | error
//! ```
//!
//! A client must `join` before anything else. Names are trimmed, lowercased
//! and must be 1-20 ASCII letters or digits. Chat content is limited to 500
//! characters and one message per second.

pub mod error;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use hub::{Hub, HubConfig};
pub use registry::{SessionId, SessionRegistry};
pub use server::{NoopHandler, RelayHandler, RelayServer, ServerConfig};
pub use session::SessionContext;
pub use stats::{HubStats, StatsSnapshot};
