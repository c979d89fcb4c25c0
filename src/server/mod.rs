//! WebSocket server
//!
//! Accepts TCP connections, upgrades them to WebSocket on the configured
//! path and runs one [`Connection`] per client.

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use handler::{NoopHandler, RelayHandler};
pub use listener::RelayServer;
