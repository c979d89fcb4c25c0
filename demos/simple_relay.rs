//! Simple chat relay example
//!
//! Run with: cargo run --example simple_relay [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example simple_relay                    # binds to 0.0.0.0:8080
//!   cargo run --example simple_relay localhost          # binds to 127.0.0.1:8080
//!   cargo run --example simple_relay 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! ## Chatting
//!
//! With websocat, in two terminals:
//!   websocat ws://localhost:8080/ws
//!   {"type":"join","username":"alice"}
//!   {"type":"message","content":"hello"}
//!
//! Any origin is accepted, so command line clients without an `Origin`
//! header can connect.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use chat_relay::registry::SessionId;
use chat_relay::{RelayHandler, RelayServer, ServerConfig, SessionContext};

/// Handler that prints session events and counts joins
struct MyHandler {
    joins: AtomicU64,
    leaves: AtomicU64,
}

impl MyHandler {
    fn new() -> Self {
        Self {
            joins: AtomicU64::new(0),
            leaves: AtomicU64::new(0),
        }
    }
}

impl RelayHandler for MyHandler {
    fn on_connection(&self, ctx: &SessionContext) -> bool {
        println!("[{}] New connection from {}", ctx.session_id, ctx.peer_addr);
        true
    }

    fn on_join(&self, ctx: &SessionContext) {
        let total = self.joins.fetch_add(1, Ordering::Relaxed) + 1;
        println!(
            "[{}] Joined as {} ({} joins so far)",
            ctx.session_id,
            ctx.username.as_deref().unwrap_or("?"),
            total
        );
    }

    fn on_leave(&self, session_id: SessionId, username: &str) {
        self.leaves.fetch_add(1, Ordering::Relaxed);
        println!("[{}] {} left", session_id, username);
    }

    fn on_disconnect(&self, ctx: &SessionContext) {
        println!("[{}] Disconnected", ctx.session_id);
    }
}

/// Parse bind address from command line argument.
///
/// Accepts `localhost`, `localhost:PORT`, `IP` or `IP:PORT`.
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let mut config = ServerConfig::default().allow_any_origin();
    if let Some(arg) = args.get(1) {
        config = config.bind(parse_bind_addr(arg)?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_relay=debug".parse()?),
        )
        .init();

    println!("Starting chat relay on ws://{}{}", config.bind_addr, config.path);

    let server = RelayServer::new(config, MyHandler::new());

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
