//! Broadcast fan-out engine
//!
//! Three independent pipelines, each an unbounded queue drained by exactly
//! one worker task:
//!
//! ```text
//!   Hub::publish ──► [chat queue]     ──► chat worker     ─┐
//!                ──► [presence queue] ──► presence worker ─┼─► every joined
//!                ──► [typing queue]   ──► typing worker   ─┘   session's buffer
//! ```
//!
//! Events on one pipeline reach every session in publication order. There
//! is no ordering across pipelines, so a burst of typing indicators never
//! waits behind chat traffic.
//!
//! Each worker takes a point-in-time recipient list from the registry,
//! encodes the event once and pushes the frame into each session's bounded
//! outbound buffer with a timeout. The presence worker reads the user list
//! under the same lock as its recipients. A session whose buffer is closed or stays
//! full past the timeout is kicked and removed through `Hub::evict`, the same
//! departure path a normal disconnect takes.

use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;

use crate::protocol::encode;
use crate::registry::{SessionHandle, SessionId};

use super::event::{Pipeline, RelayEvent};
use super::router::Hub;

/// Publish side of the three pipelines
#[derive(Debug, Clone)]
pub(crate) struct Queues {
    chat: mpsc::UnboundedSender<RelayEvent>,
    presence: mpsc::UnboundedSender<RelayEvent>,
    typing: mpsc::UnboundedSender<RelayEvent>,
}

/// Consumer side of the three pipelines, handed to the workers
pub(crate) struct Receivers {
    chat: mpsc::UnboundedReceiver<RelayEvent>,
    presence: mpsc::UnboundedReceiver<RelayEvent>,
    typing: mpsc::UnboundedReceiver<RelayEvent>,
}

/// Create the pipeline queues
pub(crate) fn queues() -> (Queues, Receivers) {
    let (chat_tx, chat_rx) = mpsc::unbounded_channel();
    let (presence_tx, presence_rx) = mpsc::unbounded_channel();
    let (typing_tx, typing_rx) = mpsc::unbounded_channel();

    (
        Queues {
            chat: chat_tx,
            presence: presence_tx,
            typing: typing_tx,
        },
        Receivers {
            chat: chat_rx,
            presence: presence_rx,
            typing: typing_rx,
        },
    )
}

impl Queues {
    /// Enqueue an event on its pipeline
    ///
    /// Never blocks. Returns `false` only if the pipeline's worker is gone.
    pub(crate) fn publish(&self, event: RelayEvent) -> bool {
        let pipeline = event.pipeline();
        let queue = match pipeline {
            Pipeline::Chat => &self.chat,
            Pipeline::Presence => &self.presence,
            Pipeline::Typing => &self.typing,
        };

        if queue.send(event).is_err() {
            tracing::warn!(pipeline = %pipeline, "Fan-out worker stopped, event dropped");
            return false;
        }
        true
    }
}

/// Running fan-out workers
///
/// Dropping this aborts the workers.
pub struct FanOutWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl FanOutWorkers {
    /// Spawn one worker per pipeline
    pub(crate) fn spawn(receivers: Receivers, hub: Hub) -> Self {
        let Receivers {
            chat,
            presence,
            typing,
        } = receivers;

        let handles = vec![
            tokio::spawn(run_pipeline(Pipeline::Chat, chat, hub.clone())),
            tokio::spawn(run_pipeline(Pipeline::Presence, presence, hub.clone())),
            tokio::spawn(run_pipeline(Pipeline::Typing, typing, hub)),
        ];

        Self { handles }
    }

    /// Stop all workers
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for FanOutWorkers {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn run_pipeline(
    pipeline: Pipeline,
    mut rx: mpsc::UnboundedReceiver<RelayEvent>,
    hub: Hub,
) {
    tracing::debug!(pipeline = %pipeline, "Fan-out worker started");

    while let Some(event) = rx.recv().await {
        deliver(&hub, pipeline, event).await;
    }

    tracing::debug!(pipeline = %pipeline, "Fan-out worker stopped");
}

/// Deliver one event to every joined session
async fn deliver(hub: &Hub, pipeline: Pipeline, event: RelayEvent) {
    let (users, recipients) = match event {
        RelayEvent::Presence => {
            let roster = hub.registry().roster().await;
            (roster.users, roster.recipients)
        }
        _ => (Vec::new(), hub.registry().recipients().await),
    };

    let frame = match encode(&event.to_frame(users)) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(pipeline = %pipeline, error = %e, "Failed to encode event");
            return;
        }
    };

    let send_timeout = hub.config().send_timeout;
    let mut failed: Vec<(SessionId, SessionHandle)> = Vec::new();
    let mut delivered = 0u64;

    for (id, handle) in recipients {
        match handle.sender.send_timeout(frame.clone(), send_timeout).await {
            Ok(()) => delivered += 1,
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    session_id = %id,
                    pipeline = %pipeline,
                    timeout_ms = send_timeout.as_millis() as u64,
                    "Outbound buffer full, evicting session"
                );
                failed.push((id, handle));
            }
            Err(SendTimeoutError::Closed(_)) => {
                tracing::debug!(
                    session_id = %id,
                    pipeline = %pipeline,
                    "Outbound buffer closed, evicting session"
                );
                failed.push((id, handle));
            }
        }
    }

    hub.stats().record_delivered(delivered);

    for (id, handle) in failed {
        handle.kick();
        hub.evict(id, pipeline).await;
    }
}
