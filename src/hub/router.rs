//! Frame router and session state machine
//!
//! `Hub` drives one session through its lifecycle. Connection tasks hand it
//! each decoded frame; it validates the frame against the session phase,
//! updates the registry and the cooldown, replies to the sender with `error`
//! frames, and publishes events to the fan-out pipelines.
//!
//! | Phase      | Frame             | Outcome                                        |
//! |------------|-------------------|------------------------------------------------|
//! | Connecting | `join`            | register, announce, publish presence; or close |
//! | Connecting | anything else     | `unauthorized`, close                          |
//! | Joined     | `message`         | publish chat; or `invalid_message`/`cooldown`  |
//! | Joined     | `typing`          | publish typing                                 |
//! | Joined     | any, once evicted | close                                          |
//! | any        | transport close   | leave, publish presence and leave notice       |
//!
//! All removals of a joined session, whether from a disconnect or from a
//! fan-out eviction, go through [`Hub::depart`], which announces the
//! departure exactly once.

use std::sync::Arc;

use tokio::sync::mpsc::error::SendTimeoutError;

use crate::protocol::{encode, is_valid_content, ClientFrame, ErrorCode, ServerFrame};
use crate::registry::{SessionHandle, SessionId, SessionRegistry};
use crate::server::handler::RelayHandler;
use crate::session::{Cooldown, CooldownCheck, SessionContext, SessionPhase, SessionState};
use crate::stats::HubStats;

use super::config::HubConfig;
use super::event::{Pipeline, RelayEvent, WallClock};
use super::fanout::{self, FanOutWorkers, Queues};

/// What the connection task should do after a frame was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep reading frames
    Continue,
    /// Flush pending frames and close the connection
    Close,
}

struct Shared {
    config: HubConfig,
    registry: Arc<SessionRegistry>,
    queues: Queues,
    cooldown: Cooldown,
    clock: WallClock,
    handler: Arc<dyn RelayHandler>,
    stats: Arc<HubStats>,
}

/// The connection hub
///
/// Cheap to clone; all clones share one registry and one set of pipelines.
#[derive(Clone)]
pub struct Hub {
    shared: Arc<Shared>,
}

impl Hub {
    /// Create a hub and spawn its three fan-out workers
    ///
    /// The workers run until the returned `FanOutWorkers` is dropped or
    /// aborted.
    pub fn start(config: HubConfig, handler: Arc<dyn RelayHandler>) -> (Self, FanOutWorkers) {
        let (queues, receivers) = fanout::queues();

        let hub = Self {
            shared: Arc::new(Shared {
                cooldown: Cooldown::new(config.message_cooldown),
                clock: WallClock::new(config.utc_offset),
                config,
                registry: Arc::new(SessionRegistry::new()),
                queues,
                handler,
                stats: Arc::new(HubStats::new()),
            }),
        };

        let workers = FanOutWorkers::spawn(receivers, hub.clone());
        (hub, workers)
    }

    /// Get the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.shared.registry
    }

    /// Get the hub statistics
    pub fn stats(&self) -> &Arc<HubStats> {
        &self.shared.stats
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    /// Get the observer handler
    pub fn handler(&self) -> &Arc<dyn RelayHandler> {
        &self.shared.handler
    }

    /// Publish an event to its pipeline
    pub fn publish(&self, event: RelayEvent) -> bool {
        let stats = &self.shared.stats;
        match &event {
            RelayEvent::Chat { .. } => stats.record_chat(),
            RelayEvent::System { .. } => stats.record_system(),
            RelayEvent::Presence => stats.record_presence(),
            RelayEvent::Typing { .. } => stats.record_typing(),
        }
        self.shared.queues.publish(event)
    }

    /// Handle one inbound frame for a session
    pub async fn handle_frame(
        &self,
        session: &mut SessionState,
        handle: &SessionHandle,
        frame: ClientFrame,
    ) -> Directive {
        // A fan-out worker may have evicted the session since its last frame
        if session.is_joined() && !self.shared.registry.contains(session.id).await {
            tracing::debug!(session_id = %session.id, "Session no longer registered, closing");
            session.close();
            return Directive::Close;
        }

        match (session.phase, frame) {
            (SessionPhase::Closed, _) => Directive::Close,

            (SessionPhase::Connecting, ClientFrame::Join { username }) => {
                self.join(session, handle, &username).await
            }
            (SessionPhase::Connecting, other) => {
                tracing::debug!(
                    session_id = %session.id,
                    frame = other.kind(),
                    "Frame before join"
                );
                self.shared.stats.record_unauthorized();
                self.reject(session, handle, ErrorCode::Unauthorized).await
            }

            (SessionPhase::Joined, ClientFrame::Message { content }) => {
                self.chat(session, handle, content).await
            }
            (SessionPhase::Joined, ClientFrame::Typing) => {
                if let Some(username) = session.username() {
                    self.publish(RelayEvent::Typing {
                        username: username.to_string(),
                    });
                }
                Directive::Continue
            }
            (SessionPhase::Joined, other) => {
                tracing::debug!(
                    session_id = %session.id,
                    frame = other.kind(),
                    "Ignoring frame"
                );
                Directive::Continue
            }
        }
    }

    /// Close a session after its transport went away or failed to decode
    ///
    /// A joined session leaves the registry and its departure is announced.
    /// A session that never joined announces an anonymous departure. A
    /// session the router already closed (rejected join, frame before join)
    /// publishes nothing. Safe to call more than once.
    pub async fn disconnect(&self, session: &mut SessionState) {
        let phase = session.phase;
        session.close();

        match phase {
            SessionPhase::Connecting => self.depart_anonymous(session.id),
            SessionPhase::Joined | SessionPhase::Closed => {
                self.depart(session.id).await;
            }
        }
    }

    /// Remove a session from the registry and announce it
    ///
    /// Returns `true` if this call removed the session. Only that call
    /// publishes the refreshed presence and the leave notice.
    pub async fn depart(&self, id: SessionId) -> bool {
        let Some(member) = self.shared.registry.leave(id).await else {
            return false;
        };

        self.shared.stats.record_departure();

        self.publish(RelayEvent::Presence);
        self.publish(RelayEvent::left(&member.name, self.shared.clock.now()));

        let online = self.shared.registry.len().await;
        tracing::info!(
            session_id = %id,
            username = %member.name,
            online = online,
            joined_secs = member.joined_at.elapsed().as_secs(),
            "User left"
        );

        self.shared.handler.on_leave(id, &member.name);
        true
    }

    /// Announce a session that closed before claiming a name
    fn depart_anonymous(&self, id: SessionId) {
        tracing::debug!(session_id = %id, "Guest left");
        self.publish(RelayEvent::Presence);
        self.publish(RelayEvent::guest_left(self.shared.clock.now()));
    }

    /// Remove a session whose outbound send failed
    pub(crate) async fn evict(&self, id: SessionId, pipeline: Pipeline) {
        if self.depart(id).await {
            self.shared.stats.record_eviction();
            tracing::warn!(session_id = %id, pipeline = %pipeline, "Session evicted");
        }
    }

    async fn join(
        &self,
        session: &mut SessionState,
        handle: &SessionHandle,
        proposed: &str,
    ) -> Directive {
        let registry = &self.shared.registry;

        let name = match registry.try_join(session.id, proposed, handle.clone()).await {
            Ok(name) => name,
            Err(e) => {
                tracing::info!(session_id = %session.id, error = %e, "Join rejected");
                self.shared.stats.record_join_rejection();
                return self.reject(session, handle, e.code()).await;
            }
        };

        session.on_join(name.clone());
        self.shared.stats.record_join();

        self.publish(RelayEvent::joined(&name, self.shared.clock.now()));
        self.publish(RelayEvent::Presence);
        let online = registry.len().await;

        tracing::info!(
            session_id = %session.id,
            peer = %session.peer_addr,
            username = %name,
            online = online,
            "User joined"
        );

        self.shared.handler.on_join(&SessionContext::from_state(session));
        Directive::Continue
    }

    async fn chat(
        &self,
        session: &mut SessionState,
        handle: &SessionHandle,
        content: String,
    ) -> Directive {
        if !is_valid_content(&content) {
            self.shared.stats.record_invalid_message();
            return self.reject(session, handle, ErrorCode::InvalidMessage).await;
        }

        let check = self.shared.cooldown.check_and_record(session);
        if let CooldownCheck::Rejected { remaining } = check {
            tracing::debug!(
                session_id = %session.id,
                remaining_ms = remaining.as_millis() as u64,
                "Message dropped by cooldown"
            );
            self.shared.stats.record_cooldown();
            return self.reject(session, handle, ErrorCode::Cooldown).await;
        }

        let Some(username) = session.username().map(str::to_string) else {
            return Directive::Close;
        };
        session.messages_sent += 1;

        self.publish(RelayEvent::Chat {
            username,
            content,
            time: self.shared.clock.now(),
        });
        Directive::Continue
    }

    /// Report an error to the session, closing it if the code is terminal
    async fn reject(
        &self,
        session: &mut SessionState,
        handle: &SessionHandle,
        code: ErrorCode,
    ) -> Directive {
        self.reply(session.id, handle, code).await;

        if code.is_terminal() {
            session.close();
            Directive::Close
        } else {
            Directive::Continue
        }
    }

    /// Send an error frame to one session
    async fn reply(&self, id: SessionId, handle: &SessionHandle, code: ErrorCode) {
        let frame = match encode(&ServerFrame::error(code)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Failed to encode error frame");
                return;
            }
        };

        match handle
            .sender
            .send_timeout(frame, self.shared.config.send_timeout)
            .await
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::debug!(session_id = %id, code = %code, "Error reply timed out");
            }
            // Writer already gone; nothing to report to
            Err(SendTimeoutError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::protocol::EncodedFrame;
    use crate::server::handler::testing::RecordingHandler;
    use crate::server::handler::NoopHandler;

    struct TestClient {
        state: SessionState,
        handle: SessionHandle,
        rx: mpsc::Receiver<EncodedFrame>,
    }

    impl TestClient {
        fn new(id: u64) -> Self {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000 + id as u16);
            let (tx, rx) = mpsc::channel(64);
            Self {
                state: SessionState::new(SessionId::new(id), addr),
                handle: SessionHandle::new(tx),
                rx,
            }
        }

        async fn send(&mut self, hub: &Hub, frame: ClientFrame) -> Directive {
            hub.handle_frame(&mut self.state, &self.handle, frame).await
        }

        async fn join(&mut self, hub: &Hub, name: &str) -> Directive {
            self.send(
                hub,
                ClientFrame::Join {
                    username: name.into(),
                },
            )
            .await
        }

        async fn say(&mut self, hub: &Hub, content: &str) -> Directive {
            self.send(
                hub,
                ClientFrame::Message {
                    content: content.into(),
                },
            )
            .await
        }

        async fn next(&mut self) -> ServerFrame {
            let frame = timeout(Duration::from_secs(1), self.rx.recv())
                .await
                .expect("timed out waiting for frame")
                .expect("outbound channel closed");
            serde_json::from_str(frame.as_str()).unwrap()
        }

        async fn take(&mut self, n: usize) -> Vec<ServerFrame> {
            let mut frames = Vec::with_capacity(n);
            for _ in 0..n {
                frames.push(self.next().await);
            }
            frames
        }

        async fn assert_quiet(&mut self) {
            let result = timeout(Duration::from_millis(100), self.rx.recv()).await;
            assert!(result.is_err(), "unexpected frame: {:?}", result);
        }
    }

    fn start() -> (Hub, FanOutWorkers) {
        Hub::start(HubConfig::default(), Arc::new(NoopHandler))
    }

    fn userlist(frames: &[ServerFrame]) -> Vec<String> {
        frames
            .iter()
            .rev()
            .find_map(|f| match f {
                ServerFrame::Userlist { users } => Some(users.clone()),
                _ => None,
            })
            .expect("no userlist frame")
    }

    fn system_contents(frames: &[ServerFrame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| match f {
                ServerFrame::System { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    fn chats(frames: &[ServerFrame]) -> Vec<(String, String)> {
        frames
            .iter()
            .filter_map(|f| match f {
                ServerFrame::Message {
                    username, content, ..
                } => Some((username.clone(), content.clone())),
                _ => None,
            })
            .collect()
    }

    fn error_code(frame: &ServerFrame) -> Option<ErrorCode> {
        match frame {
            ServerFrame::Error { error, .. } => Some(*error),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_join_announces_and_publishes_presence() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);

        assert_eq!(alice.join(&hub, "  Alice ").await, Directive::Continue);
        assert!(alice.state.is_joined());
        assert_eq!(alice.state.username(), Some("alice"));

        let frames = alice.take(2).await;
        assert_eq!(userlist(&frames), vec!["alice"]);
        assert_eq!(system_contents(&frames), vec!["alice joined the chat"]);
    }

    #[tokio::test]
    async fn test_presence_tracks_joins_and_disconnects() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        let mut bob = TestClient::new(2);

        alice.join(&hub, "alice").await;
        alice.take(2).await;
        bob.join(&hub, "bob").await;

        let frames = bob.take(2).await;
        assert_eq!(userlist(&frames), vec!["alice", "bob"]);
        let frames = alice.take(2).await;
        assert_eq!(userlist(&frames), vec!["alice", "bob"]);

        hub.disconnect(&mut alice.state).await;
        assert!(alice.state.is_closed());

        let frames = bob.take(2).await;
        assert_eq!(userlist(&frames), vec!["bob"]);
        assert_eq!(system_contents(&frames), vec!["alice left the chat"]);

        // Disconnecting again announces nothing
        hub.disconnect(&mut alice.state).await;
        bob.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_presence_is_order_independent() {
        let (hub, _workers) = start();
        let mut bob = TestClient::new(1);
        let mut alice = TestClient::new(2);

        bob.join(&hub, "bob").await;
        bob.take(2).await;
        alice.join(&hub, "alice").await;

        assert_eq!(hub.registry().snapshot().await, vec!["alice", "bob"]);
        let frames = alice.take(2).await;
        assert_eq!(userlist(&frames), vec!["alice", "bob"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_userlist_matches_registry() {
        let (hub, _workers) = start();
        let mut watcher = TestClient::new(100);
        watcher.join(&hub, "watcher").await;
        watcher.take(2).await;

        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                let mut client = TestClient::new(i);
                client.join(&hub, &format!("user{}", i)).await;
                if i % 2 == 0 {
                    hub.disconnect(&mut client.state).await;
                }
                client
            }));
        }
        let mut clients = Vec::new();
        for task in tasks {
            clients.push(task.await.unwrap());
        }

        let mut last = None;
        while let Ok(Some(frame)) = timeout(Duration::from_millis(200), watcher.rx.recv()).await {
            if let ServerFrame::Userlist { users } = serde_json::from_str(frame.as_str()).unwrap() {
                last = Some(users);
            }
        }

        assert_eq!(hub.registry().len().await, 5);
        assert_eq!(last.expect("no userlist frame"), hub.registry().snapshot().await);
    }

    #[tokio::test]
    async fn test_message_before_join_is_unauthorized() {
        let (hub, _workers) = start();
        let mut watcher = TestClient::new(1);
        watcher.join(&hub, "watcher").await;
        watcher.take(2).await;

        let mut anon = TestClient::new(2);
        let directive = anon.say(&hub, "hello").await;

        assert_eq!(directive, Directive::Close);
        assert!(anon.state.is_closed());
        assert_eq!(error_code(&anon.next().await), Some(ErrorCode::Unauthorized));

        // The transport closing afterwards publishes nothing either
        hub.disconnect(&mut anon.state).await;
        watcher.assert_quiet().await;
        assert_eq!(hub.stats().snapshot().chat_messages, 0);
    }

    #[tokio::test]
    async fn test_typing_before_join_is_unauthorized() {
        let (hub, _workers) = start();
        let mut anon = TestClient::new(1);

        assert_eq!(anon.send(&hub, ClientFrame::Typing).await, Directive::Close);
        assert_eq!(error_code(&anon.next().await), Some(ErrorCode::Unauthorized));
    }

    #[tokio::test]
    async fn test_invalid_username_closes() {
        let (hub, _workers) = start();
        let mut client = TestClient::new(1);

        assert_eq!(client.join(&hub, "bo b").await, Directive::Close);
        assert!(client.state.is_closed());
        assert_eq!(
            error_code(&client.next().await),
            Some(ErrorCode::InvalidUsername)
        );
        assert!(hub.registry().is_empty().await);

        // Closed sessions accept nothing further
        assert_eq!(client.join(&hub, "bob").await, Directive::Close);
        assert!(hub.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_taken_username_closes() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        alice.join(&hub, "alice").await;

        let mut imposter = TestClient::new(2);
        assert_eq!(imposter.join(&hub, "ALICE").await, Directive::Close);
        assert_eq!(
            error_code(&imposter.next().await),
            Some(ErrorCode::UsernameTaken)
        );
        assert_eq!(hub.registry().len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_drops_fast_second_message() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        alice.join(&hub, "alice").await;
        alice.take(2).await;

        assert_eq!(alice.say(&hub, "first").await, Directive::Continue);
        assert_eq!(alice.say(&hub, "second").await, Directive::Continue);

        let frames = alice.take(2).await;
        assert_eq!(chats(&frames), vec![("alice".into(), "first".into())]);
        assert!(frames
            .iter()
            .any(|f| error_code(f) == Some(ErrorCode::Cooldown)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(alice.say(&hub, "third").await, Directive::Continue);

        let frame = alice.next().await;
        assert_eq!(chats(&[frame]), vec![("alice".into(), "third".into())]);
        alice.assert_quiet().await;

        let stats = hub.stats().snapshot();
        assert_eq!(stats.chat_messages, 2);
        assert_eq!(stats.cooldown_rejections, 1);
    }

    #[tokio::test]
    async fn test_content_length_boundary() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        alice.join(&hub, "alice").await;
        alice.take(2).await;

        // Rejected content does not consume the cooldown window
        let too_long = "a".repeat(501);
        assert_eq!(alice.say(&hub, &too_long).await, Directive::Continue);
        assert_eq!(
            error_code(&alice.next().await),
            Some(ErrorCode::InvalidMessage)
        );

        assert_eq!(alice.say(&hub, "").await, Directive::Continue);
        assert_eq!(
            error_code(&alice.next().await),
            Some(ErrorCode::InvalidMessage)
        );

        let max = "a".repeat(500);
        assert_eq!(alice.say(&hub, &max).await, Directive::Continue);
        let frame = alice.next().await;
        assert_eq!(chats(&[frame]), vec![("alice".into(), max)]);
        assert!(alice.state.is_joined());
    }

    #[tokio::test]
    async fn test_chat_carries_server_time() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        alice.join(&hub, "alice").await;
        alice.take(2).await;

        alice.say(&hub, "hi").await;
        match alice.next().await {
            ServerFrame::Message { time, .. } => {
                assert_eq!(time.len(), 5);
                assert_eq!(&time[2..3], ":");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_typing_reaches_everyone() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        let mut bob = TestClient::new(2);
        alice.join(&hub, "alice").await;
        alice.take(2).await;
        bob.join(&hub, "bob").await;
        alice.take(2).await;
        bob.take(2).await;

        assert_eq!(bob.send(&hub, ClientFrame::Typing).await, Directive::Continue);

        assert_eq!(
            alice.next().await,
            ServerFrame::Typing {
                username: "bob".into()
            }
        );
        assert_eq!(
            bob.next().await,
            ServerFrame::Typing {
                username: "bob".into()
            }
        );
    }

    #[tokio::test]
    async fn test_delivery_only_to_live_sessions() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        let mut bob = TestClient::new(2);
        let mut lurker = TestClient::new(3);

        alice.join(&hub, "alice").await;
        alice.take(2).await;
        bob.join(&hub, "bob").await;
        alice.take(2).await;
        bob.take(2).await;

        hub.disconnect(&mut alice.state).await;
        bob.take(2).await;

        bob.say(&hub, "anyone here?").await;
        let frame = bob.next().await;
        assert_eq!(chats(&[frame]), vec![("bob".into(), "anyone here?".into())]);

        alice.assert_quiet().await;
        lurker.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_joined_session_ignores_second_join_and_unknown() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        alice.join(&hub, "alice").await;
        alice.take(2).await;

        assert_eq!(alice.join(&hub, "alicia").await, Directive::Continue);
        assert_eq!(alice.send(&hub, ClientFrame::Unknown).await, Directive::Continue);

        assert_eq!(alice.state.username(), Some("alice"));
        assert_eq!(hub.registry().snapshot().await, vec!["alice"]);
        alice.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_disconnect_before_join_announces_guest() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        alice.join(&hub, "alice").await;
        alice.take(2).await;

        let mut anon = TestClient::new(2);
        hub.disconnect(&mut anon.state).await;
        assert!(anon.state.is_closed());

        let frames = alice.take(2).await;
        assert_eq!(userlist(&frames), vec!["alice"]);
        let guest = frames
            .iter()
            .find_map(|f| match f {
                ServerFrame::System {
                    username, content, ..
                } => Some((username.clone(), content.clone())),
                _ => None,
            })
            .expect("no system frame");
        assert_eq!(guest, ("".to_string(), "a guest left the chat".to_string()));

        // Announced once
        hub.disconnect(&mut anon.state).await;
        alice.assert_quiet().await;
        anon.assert_quiet().await;
        assert_eq!(hub.stats().snapshot().departures, 0);
    }

    #[tokio::test]
    async fn test_failed_send_evicts_once() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        let mut bob = TestClient::new(2);
        alice.join(&hub, "alice").await;
        alice.take(2).await;
        bob.join(&hub, "bob").await;
        alice.take(2).await;

        // Bob's writer dies without the connection task noticing yet
        let TestClient {
            state: mut bob_state,
            handle: bob_handle,
            rx: bob_rx,
        } = bob;
        drop(bob_rx);

        alice.say(&hub, "hello bob").await;

        let frames = alice.take(3).await;
        assert_eq!(chats(&frames), vec![("alice".into(), "hello bob".into())]);
        assert_eq!(userlist(&frames), vec!["alice"]);
        assert_eq!(system_contents(&frames), vec!["bob left the chat"]);

        timeout(Duration::from_secs(1), bob_handle.kicked())
            .await
            .expect("evicted session should be kicked");

        // The connection task's own cleanup must not announce again
        hub.disconnect(&mut bob_state).await;
        alice.assert_quiet().await;

        let stats = hub.stats().snapshot();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.departures, 1);
    }

    #[tokio::test]
    async fn test_evicted_session_cannot_publish() {
        let (hub, _workers) = start();
        let mut alice = TestClient::new(1);
        let mut bob = TestClient::new(2);
        alice.join(&hub, "alice").await;
        alice.take(2).await;
        bob.join(&hub, "bob").await;
        alice.take(2).await;

        let TestClient {
            state: mut stale_state,
            handle: stale_handle,
            rx: stale_rx,
        } = bob;
        drop(stale_rx);

        alice.say(&hub, "hi").await;
        let frames = alice.take(3).await;
        assert_eq!(system_contents(&frames), vec!["bob left the chat"]);

        // The freed name goes to a new session
        let mut bob = TestClient::new(3);
        assert_eq!(bob.join(&hub, "bob").await, Directive::Continue);
        bob.take(2).await;
        alice.take(2).await;

        // The evicted session's connection has not noticed the kick yet
        let directive = hub
            .handle_frame(
                &mut stale_state,
                &stale_handle,
                ClientFrame::Message {
                    content: "still here".into(),
                },
            )
            .await;
        assert_eq!(directive, Directive::Close);
        assert!(stale_state.is_closed());
        assert_eq!(
            hub.handle_frame(&mut stale_state, &stale_handle, ClientFrame::Typing)
                .await,
            Directive::Close
        );

        hub.disconnect(&mut stale_state).await;
        alice.assert_quiet().await;
        bob.assert_quiet().await;

        let stats = hub.stats().snapshot();
        assert_eq!(stats.chat_messages, 1);
        assert_eq!(stats.typing_events, 0);
        assert_eq!(hub.registry().snapshot().await, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_full_buffer_times_out_and_evicts() {
        let config = HubConfig::default().send_timeout(Duration::from_millis(50));
        let (hub, _workers) = Hub::start(config, Arc::new(NoopHandler));

        let mut alice = TestClient::new(1);
        alice.join(&hub, "alice").await;
        alice.take(2).await;

        // A session whose buffer holds a single frame and is never drained
        let (tx, _stalled_rx) = mpsc::channel(1);
        let slow_handle = SessionHandle::new(tx);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000);
        let mut slow = SessionState::new(SessionId::new(2), addr);
        hub.handle_frame(
            &mut slow,
            &slow_handle,
            ClientFrame::Join {
                username: "slow".into(),
            },
        )
        .await;

        // The first of the two join frames fills the buffer; the second
        // times out and evicts
        let frames = alice.take(4).await;
        assert_eq!(
            system_contents(&frames),
            vec!["slow joined the chat", "slow left the chat"]
        );
        assert_eq!(userlist(&frames), vec!["alice"]);

        timeout(Duration::from_secs(2), slow_handle.kicked())
            .await
            .expect("stalled session should be kicked");
        assert!(!hub.registry().contains(SessionId::new(2)).await);
        assert_eq!(hub.registry().snapshot().await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_handler_hooks_fire_once() {
        let handler = Arc::new(RecordingHandler::default());
        let (hub, _workers) = Hub::start(HubConfig::default(), handler.clone());

        let mut alice = TestClient::new(1);
        alice.join(&hub, "alice").await;
        hub.disconnect(&mut alice.state).await;
        hub.disconnect(&mut alice.state).await;

        assert_eq!(handler.events(), vec!["join:1:alice", "leave:1:alice"]);
    }
}
