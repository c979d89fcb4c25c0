//! Per-connection handler
//!
//! Each accepted WebSocket gets one `Connection`, which runs two tasks:
//!
//! - the reader (this task): decodes inbound text frames and hands them to
//!   the hub, until the peer closes, a frame fails to decode, the hub asks
//!   for a close, or a fan-out worker kicks the session;
//! - the writer: drains the session's bounded outbound buffer into the
//!   socket and sends a close frame once every sender is gone.
//!
//! On exit the reader runs the departure path, drops its sender and gives
//! the writer `close_timeout` to flush whatever is still queued (such as a
//! terminal `error` frame).

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::{CodecError, Error, Result};
use crate::hub::{Directive, Hub};
use crate::protocol::{decode, EncodedFrame};
use crate::registry::{SessionHandle, SessionId};
use crate::server::config::ServerConfig;
use crate::session::{SessionContext, SessionState};

/// Frames written per flush
const WRITE_BATCH: usize = 32;

/// Per-connection handler
pub struct Connection<S> {
    state: SessionState,
    ws: WebSocketStream<S>,
    hub: Hub,
    outbound_buffer: usize,
    close_timeout: Duration,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a connection handler for an upgraded socket
    pub fn new(
        state: SessionState,
        ws: WebSocketStream<S>,
        hub: Hub,
        config: &ServerConfig,
    ) -> Self {
        Self {
            state,
            ws,
            hub,
            outbound_buffer: config.outbound_buffer.max(1),
            close_timeout: config.close_timeout,
        }
    }

    /// Run the connection until it closes
    pub async fn run(self) -> Result<()> {
        let Self {
            mut state,
            ws,
            hub,
            outbound_buffer,
            close_timeout,
        } = self;

        let session_id = state.id;
        let (sink, mut stream) = ws.split();
        let (tx, rx) = mpsc::channel(outbound_buffer);
        let handle = SessionHandle::new(tx);
        let mut writer = tokio::spawn(write_loop(session_id, sink, rx));

        let result = read_loop(&hub, &mut state, &handle, &mut stream).await;

        hub.disconnect(&mut state).await;
        hub.handler().on_disconnect(&SessionContext::from_state(&state));

        // The writer finishes once the last sender is dropped
        drop(handle);
        if tokio::time::timeout(close_timeout, &mut writer).await.is_err() {
            tracing::debug!(session_id = %session_id, "Writer did not finish, aborting");
            writer.abort();
        }

        tracing::debug!(
            session_id = %session_id,
            duration_ms = state.duration().as_millis() as u64,
            messages = state.messages_sent,
            "Session ended"
        );

        result
    }
}

async fn read_loop<S>(
    hub: &Hub,
    state: &mut SessionState,
    handle: &SessionHandle,
    stream: &mut SplitStream<WebSocketStream<S>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            msg = stream.next() => msg,
            _ = handle.kicked() => {
                tracing::debug!(session_id = %state.id, "Session kicked by fan-out");
                None
            }
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        };

        let frame = match msg {
            Message::Text(text) => decode(text.as_str()),
            Message::Binary(_) => Err(Error::Codec(CodecError::NotText)),
            Message::Close(_) => return Ok(()),
            // Ping replies are queued by tungstenite itself
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(session_id = %state.id, error = %e, "Undecodable frame, closing");
                return Err(e);
            }
        };

        if hub.handle_frame(state, handle, frame).await == Directive::Close {
            return Ok(());
        }
    }
}

async fn write_loop<S>(
    session_id: SessionId,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::Receiver<EncodedFrame>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.feed(frame.into_message()).await {
            tracing::debug!(session_id = %session_id, error = %e, "Write failed");
            return;
        }

        // Batch whatever else is already queued into one flush
        let mut batched = 1;
        while batched < WRITE_BATCH {
            let Ok(frame) = rx.try_recv() else { break };
            if let Err(e) = sink.feed(frame.into_message()).await {
                tracing::debug!(session_id = %session_id, error = %e, "Write failed");
                return;
            }
            batched += 1;
        }

        if let Err(e) = sink.flush().await {
            tracing::debug!(session_id = %session_id, error = %e, "Flush failed");
            return;
        }
    }

    let _ = sink.close().await;
}
