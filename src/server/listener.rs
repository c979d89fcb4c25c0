//! Relay server listener
//!
//! Handles the TCP accept loop, the plain-HTTP health check, the WebSocket
//! upgrade (path and origin checks) and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::WebSocketStream;

use crate::error::Result;
use crate::hub::{FanOutWorkers, Hub, HubConfig};
use crate::registry::{SessionId, SessionRegistry};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::RelayHandler;
use crate::session::{SessionContext, SessionState};
use crate::stats::HubStats;

/// Response to a health check
const PONG_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/plain\r\n\
Content-Length: 4\r\n\
Connection: close\r\n\
\r\n\
pong";

/// Upper bound on a health check request head
const MAX_PING_HEAD: usize = 8 * 1024;

/// Wait before peeking again at a partly received request line
const PEEK_RETRY: Duration = Duration::from_millis(5);

/// WebSocket chat relay server
pub struct RelayServer<H: RelayHandler> {
    config: Arc<ServerConfig>,
    handler: Arc<H>,
    hub: Hub,
    workers: FanOutWorkers,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<H: RelayHandler> RelayServer<H> {
    /// Create a new server with the given configuration and handler
    ///
    /// Spawns the fan-out workers, so this must be called inside a Tokio
    /// runtime.
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let hub_config = config.hub.clone();
        Self::with_hub_config(config, handler, hub_config)
    }

    /// Create a new server with a custom hub configuration
    pub fn with_hub_config(config: ServerConfig, handler: H, hub_config: HubConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let handler = Arc::new(handler);
        let (hub, workers) = Hub::start(hub_config, handler.clone());

        Self {
            config: Arc::new(config),
            handler,
            hub,
            workers,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.hub.registry()
    }

    /// Get a reference to the hub statistics
    pub fn stats(&self) -> &Arc<HubStats> {
        self.hub.stats()
    }

    /// Get the hub
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.path,
            "Chat relay listening"
        );
        Ok(listener)
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve_until(&listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` resolves
    ///
    /// Stops accepting and aborts the fan-out workers on shutdown.
    pub async fn serve_until<F>(&self, listener: &TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        };

        // Stop fan-out on shutdown
        self.workers.abort();

        result
    }

    /// Accept connections from a bound listener
    pub async fn serve(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(session_id = %session_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = Arc::clone(&self.config);
        let handler = Arc::clone(&self.handler);
        let hub = self.hub.clone();

        tokio::spawn(async move {
            let _permit = permit;

            let accepted = tokio::time::timeout(config.handshake_timeout, accept(socket, &config));
            let (ws, origin) = match accepted.await {
                Ok(Ok(Some(upgraded))) => upgraded,
                Ok(Ok(None)) => {
                    tracing::debug!(peer = %peer_addr, "Answered health check");
                    return;
                }
                Ok(Err(e)) => {
                    tracing::debug!(
                        session_id = %session_id,
                        peer = %peer_addr,
                        error = %e,
                        "Upgrade failed"
                    );
                    return;
                }
                Err(_) => {
                    tracing::debug!(
                        session_id = %session_id,
                        peer = %peer_addr,
                        "Upgrade timed out"
                    );
                    return;
                }
            };

            let state = SessionState::new(session_id, peer_addr).with_origin(origin);
            if !handler.on_connection(&SessionContext::from_state(&state)) {
                tracing::debug!(session_id = %session_id, "Connection refused by handler");
                return;
            }

            hub.stats().connection_opened();
            let connection = Connection::new(state, ws, hub.clone(), &config);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = %session_id,
                    error = %e,
                    "Connection error"
                );
            }

            hub.stats().connection_closed();
            tracing::debug!(session_id = %session_id, "Connection closed");
        });
    }
}

/// Answer a health check or upgrade the socket
///
/// Returns `None` once a health check has been answered.
async fn accept(
    mut socket: TcpStream,
    config: &ServerConfig,
) -> Result<Option<(WebSocketStream<TcpStream>, Option<String>)>> {
    if let Some(path) = config.ping_path.as_deref() {
        if is_ping_request(&socket, path).await? {
            answer_ping(&mut socket).await?;
            return Ok(None);
        }
    }

    upgrade(socket, config).await.map(Some)
}

/// Check, without consuming anything, whether the request line is
/// `GET <path>`
async fn is_ping_request(socket: &TcpStream, path: &str) -> std::io::Result<bool> {
    let expected = format!("GET {}", path).into_bytes();
    let mut buf = vec![0u8; expected.len() + 1];

    loop {
        let n = socket.peek(&mut buf).await?;
        if n == 0 {
            return Ok(false);
        }

        let seen = n.min(expected.len());
        if buf[..seen] != expected[..seen] {
            return Ok(false);
        }
        if n > expected.len() {
            return Ok(matches!(buf[expected.len()], b' ' | b'?'));
        }

        tokio::time::sleep(PEEK_RETRY).await;
    }
}

async fn answer_ping(socket: &mut TcpStream) -> std::io::Result<()> {
    // Read the request head so closing does not reset the connection
    let mut head = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];
    while head.len() < MAX_PING_HEAD && !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }

    socket.write_all(PONG_RESPONSE).await?;
    socket.shutdown().await
}

/// Perform the WebSocket upgrade, enforcing path and origin
///
/// Returns the upgraded stream and the request's `Origin` header.
async fn upgrade(
    socket: TcpStream,
    config: &ServerConfig,
) -> Result<(WebSocketStream<TcpStream>, Option<String>)> {
    let mut origin = None;

    let ws = tokio_tungstenite::accept_hdr_async(socket, |req: &Request, response: Response| {
        origin = req
            .headers()
            .get("origin")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        check_request(config, req.uri().path(), origin.as_deref()).map(|()| response)
    })
    .await?;

    Ok((ws, origin))
}

fn check_request(
    config: &ServerConfig,
    path: &str,
    origin: Option<&str>,
) -> std::result::Result<(), ErrorResponse> {
    if path != config.path {
        tracing::debug!(path = %path, "Upgrade rejected: unknown path");
        return Err(reject(StatusCode::NOT_FOUND, "not found"));
    }

    if !config.is_origin_allowed(origin) {
        tracing::warn!(
            origin = origin.unwrap_or("<none>"),
            "Upgrade rejected: origin not allowed"
        );
        return Err(reject(StatusCode::FORBIDDEN, "origin not allowed"));
    }

    Ok(())
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
