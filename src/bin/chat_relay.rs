//! Chat relay server binary
//!
//! Every option can also be set through a `CHAT_RELAY_*` environment
//! variable. Log output is controlled by `RUST_LOG` (default
//! `chat_relay=info`).
//!
//! ```text
//!   chat-relay --bind 127.0.0.1:8080 --allowed-origins http://localhost:3000
//!   CHAT_RELAY_ALLOW_ANY_ORIGIN=true chat-relay
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chat_relay::registry::SessionId;
use chat_relay::server::config::{DEFAULT_PATH, DEFAULT_PING_PATH};
use chat_relay::{HubStats, RelayHandler, RelayServer, ServerConfig, SessionContext};

#[derive(Debug, Parser)]
#[command(name = "chat-relay", version, about = "Real-time WebSocket chat relay")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "CHAT_RELAY_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Request path the WebSocket endpoint is served on
    #[arg(long, env = "CHAT_RELAY_PATH", default_value = DEFAULT_PATH)]
    path: String,

    /// Plain-HTTP health check path answering `pong` (empty = off)
    #[arg(long, env = "CHAT_RELAY_PING_PATH", default_value = DEFAULT_PING_PATH)]
    ping_path: String,

    /// Comma separated list of allowed `Origin` header values
    #[arg(
        long,
        env = "CHAT_RELAY_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,https://chat-frontend-kappa-nine.vercel.app"
    )]
    allowed_origins: Vec<String>,

    /// Accept upgrades from any origin
    #[arg(long, env = "CHAT_RELAY_ALLOW_ANY_ORIGIN")]
    allow_any_origin: bool,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "CHAT_RELAY_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Minimum milliseconds between two chat messages of one client
    #[arg(long, env = "CHAT_RELAY_COOLDOWN_MS", default_value_t = 1000)]
    cooldown_ms: u64,

    /// Milliseconds to wait on a slow client before dropping it
    #[arg(long, env = "CHAT_RELAY_SEND_TIMEOUT_MS", default_value_t = 2000)]
    send_timeout_ms: u64,

    /// Frames buffered per client
    #[arg(long, env = "CHAT_RELAY_OUTBOUND_BUFFER", default_value_t = 64)]
    outbound_buffer: usize,

    /// UTC offset for message timestamps, e.g. `+03:00` or `UTC`
    #[arg(
        long,
        env = "CHAT_RELAY_UTC_OFFSET",
        default_value = "+03:00",
        value_parser = parse_offset
    )]
    utc_offset: FixedOffset,

    /// Seconds between statistics log lines (0 = off)
    #[arg(long, env = "CHAT_RELAY_STATS_INTERVAL_SECS", default_value_t = 30)]
    stats_interval_secs: u64,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let config = ServerConfig::with_addr(self.bind)
            .path(self.path.clone())
            .ping_path(Some(self.ping_path.clone()).filter(|p| !p.is_empty()))
            .max_connections(self.max_connections)
            .outbound_buffer(self.outbound_buffer)
            .message_cooldown(Duration::from_millis(self.cooldown_ms))
            .send_timeout(Duration::from_millis(self.send_timeout_ms))
            .utc_offset(self.utc_offset)
            .stats_interval(Duration::from_secs(self.stats_interval_secs));

        if self.allow_any_origin {
            config.allow_any_origin()
        } else {
            config.allowed_origins(self.allowed_origins.iter().map(|o| o.trim().to_string()))
        }
    }
}

fn parse_offset(s: &str) -> Result<FixedOffset, String> {
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return Ok(FixedOffset::east_opt(0).ok_or("invalid offset")?);
    }
    s.parse::<FixedOffset>()
        .map_err(|e| format!("invalid UTC offset '{}': {}", s, e))
}

/// Access log
struct LoggingHandler;

impl RelayHandler for LoggingHandler {
    fn on_connection(&self, ctx: &SessionContext) -> bool {
        tracing::info!(
            session_id = %ctx.session_id,
            peer = %ctx.peer_addr,
            origin = ctx.origin.as_deref().unwrap_or("-"),
            "Client connected"
        );
        true
    }

    fn on_join(&self, ctx: &SessionContext) {
        tracing::info!(
            session_id = %ctx.session_id,
            peer = %ctx.peer_addr,
            username = ctx.username.as_deref().unwrap_or("-"),
            "Client joined"
        );
    }

    fn on_leave(&self, session_id: SessionId, username: &str) {
        tracing::info!(session_id = %session_id, username = %username, "Client left");
    }

    fn on_disconnect(&self, ctx: &SessionContext) {
        tracing::info!(
            session_id = %ctx.session_id,
            peer = %ctx.peer_addr,
            "Client disconnected"
        );
    }
}

async fn log_stats(stats: Arc<HubStats>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let s = stats.snapshot();
        tracing::info!(
            uptime_secs = s.uptime.as_secs(),
            active = s.active_connections,
            connections = s.connections,
            joins = s.joins,
            departures = s.departures,
            evictions = s.evictions,
            chat = s.chat_messages,
            typing = s.typing_events,
            cooldown_rejections = s.cooldown_rejections,
            invalid = s.invalid_messages + s.unauthorized_frames,
            delivered = s.frames_delivered,
            "Relay stats"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = cli.server_config();
    tracing::info!(
        origins = ?config.allowed_origins,
        cooldown_ms = cli.cooldown_ms,
        utc_offset = %cli.utc_offset,
        "Starting chat relay"
    );

    let stats_interval = config.stats_interval;
    let server = RelayServer::new(config, LoggingHandler);

    let stats_task = (!stats_interval.is_zero())
        .then(|| tokio::spawn(log_stats(Arc::clone(server.stats()), stats_interval)));

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    if let Some(task) = stats_task {
        task.abort();
    }

    if let Err(e) = result {
        tracing::error!(error = %e, "Server error");
        return Err(e.into());
    }

    tracing::info!("Shut down");
    Ok(())
}
