//! Connection Manager
//!
//! Owns one physical WebSocket connection at a time to the chat backend and
//! presents a stable logical interface to the controller that hides
//! reconnection churn.
//!
//! # Responsibilities
//!
//! - Dial the live channel and track [`ConnectionState`]
//! - Emit keepalive pings on a fixed period while open
//! - Parse inbound frames and forward them as [`LinkEvent`]s
//! - Schedule reconnect attempts with exponential backoff after a drop
//! - Shut down terminally on [`ConnectionManager::disconnect`]
//!
//! # Send Policy
//!
//! [`ConnectionManager::send`] transmits only while `Open` and silently
//! drops otherwise. The transport never buffers application messages across
//! a disconnect: a buffered-then-replayed submission could arrive out of
//! order relative to a fallback submission made in the interim. The
//! controller chooses the fallback path instead.

pub mod backoff;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use crate::protocol::{self, ClientMessage, ServerMessage};

pub use backoff::ReconnectPolicy;

/// Logical state of the live channel.
///
/// Owned exclusively by the connection manager; transitions happen on
/// transport events only, never at the controller's request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been attempted yet
    Idle,
    /// A dial is in flight
    Connecting,
    /// The channel is open and usable
    Open,
    /// The channel is closed (dropped, failed, or shut down)
    Closed,
}

/// Events from the connection manager to the controller.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    /// The live channel became available
    Up,
    /// The live channel became unavailable
    Down,
    /// A well-formed inbound message arrived
    Inbound(ServerMessage),
}

/// Configuration for the connection manager.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Fully derived live-channel address (see [`protocol::channel_url`])
    pub url: String,
    /// Interval between keepalive pings while open
    pub keepalive_interval: Duration,
    /// Base delay for reconnect backoff
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect backoff delay
    pub reconnect_cap: Duration,
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
}

/// Manages the single live WebSocket connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    policy: Mutex<ReconnectPolicy>,
    shutdown: AtomicBool,
    outbound: RwLock<Option<mpsc::UnboundedSender<ClientMessage>>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager and the receiver the controller consumes link
    /// events from. The manager does not dial until [`connect`] is called.
    ///
    /// [`connect`]: ConnectionManager::connect
    #[must_use]
    pub fn new(config: ConnectionConfig) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::new(
            config.reconnect_base,
            config.reconnect_cap,
            config.max_reconnect_attempts,
        );
        let inner = Arc::new(Inner {
            config,
            state: RwLock::new(ConnectionState::Idle),
            policy: Mutex::new(policy),
            shutdown: AtomicBool::new(false),
            outbound: RwLock::new(None),
            events,
            tasks: Mutex::new(Vec::new()),
        });
        (Self { inner }, event_rx)
    }

    /// Current logical state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Whether the channel is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Idempotent entry point: dial the live channel.
    ///
    /// No-op while already connecting or open, and permanently a no-op
    /// after [`disconnect`].
    ///
    /// [`disconnect`]: ConnectionManager::disconnect
    pub fn connect(&self) {
        Inner::connect(&self.inner);
    }

    /// Transmit a message if the channel is open; drop it silently otherwise.
    pub fn send(&self, message: ClientMessage) {
        if self.state() != ConnectionState::Open {
            debug!("dropping outbound message: channel not open");
            return;
        }
        let sender = self.inner.outbound.read().clone();
        if let Some(sender) = sender {
            // Writer shutting down concurrently is equivalent to not-open
            let _ = sender.send(message);
        }
    }

    /// Terminal shutdown: suppress all future reconnection, stop the
    /// keepalive and any pending reconnect timer, and close the transport.
    /// The manager never reopens after this call.
    pub fn disconnect(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.policy.lock().disable();
        *self.inner.state.write() = ConnectionState::Closed;
        // Dropping the outbound sender ends the writer and closes the socket
        self.inner.outbound.write().take();
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    fn connect(inner: &Arc<Self>) {
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut state = inner.state.write();
            if matches!(*state, ConnectionState::Connecting | ConnectionState::Open) {
                return;
            }
            *state = ConnectionState::Connecting;
        }
        let task_inner = Arc::clone(inner);
        let task = tokio::spawn(async move {
            Self::run_connection(&task_inner).await;
        });
        Self::track_task(inner, task);
    }

    /// Retain a task handle for terminal shutdown, sweeping out finished
    /// ones so a flapping network does not accumulate handles.
    fn track_task(inner: &Arc<Self>, task: JoinHandle<()>) {
        let mut tasks = inner.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// One connection lifetime: dial, pump frames until the transport
    /// closes, then hand off to the reconnect scheduler.
    async fn run_connection(inner: &Arc<Self>) {
        let url = inner.config.url.clone();
        let stream = match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _response)) => stream,
            Err(err) => {
                warn!(error = %err, "live channel dial failed");
                *inner.state.write() = ConnectionState::Closed;
                Self::schedule_reconnect(inner);
                return;
            }
        };

        {
            // Checked under the state lock so a disconnect() racing the
            // dial cannot be overwritten with Open
            let mut state = inner.state.write();
            if inner.shutdown.load(Ordering::SeqCst) {
                return;
            }
            *state = ConnectionState::Open;
            inner.policy.lock().reset();
        }
        debug!(url = %url, "live channel open");
        let _ = inner.events.send(LinkEvent::Up);

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        *inner.outbound.write() = Some(outbound_tx);

        // Writer: drains the outbound queue onto the socket. Ends when the
        // outbound sender is dropped (close or shutdown).
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let Ok(text) = serde_json::to_string(&message) else {
                    continue;
                };
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Keepalive: fire-and-forget pings while open. No pong is awaited;
        // absence of a response is the peer's concern, not grounds for a
        // local close.
        let keepalive_inner = Arc::clone(inner);
        let keepalive = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(keepalive_inner.config.keepalive_interval);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                let sender = keepalive_inner.outbound.read().clone();
                match sender {
                    Some(sender) if sender.send(ClientMessage::Ping).is_ok() => {}
                    _ => break,
                }
            }
        });

        while let Some(frame) = source.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match protocol::parse_inbound(&text) {
                    Some(message) => {
                        if inner.events.send(LinkEvent::Inbound(message)).is_err() {
                            break;
                        }
                    }
                    None => debug!("dropping malformed inbound frame"),
                },
                Ok(WsMessage::Close(_)) | Err(_) => break,
                // Binary and control frames carry nothing for this protocol
                Ok(_) => {}
            }
        }

        keepalive.abort();
        inner.outbound.write().take();
        let _ = writer.await;

        *inner.state.write() = ConnectionState::Closed;
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        debug!("live channel closed");
        let _ = inner.events.send(LinkEvent::Down);
        Self::schedule_reconnect(inner);
    }

    fn schedule_reconnect(inner: &Arc<Self>) {
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let delay = inner.policy.lock().next_attempt();
        let Some(delay) = delay else {
            warn!("reconnect attempts exhausted, giving up");
            return;
        };
        debug!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        let timer_inner = Arc::clone(inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Self::connect(&timer_inner);
        });
        Self::track_task(inner, task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            // Nothing listens here; dials fail fast
            url: "ws://127.0.0.1:1/ws/widget/test".to_string(),
            keepalive_interval: Duration::from_millis(100),
            reconnect_base: Duration::from_millis(10),
            reconnect_cap: Duration::from_millis(50),
            max_reconnect_attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_idle() {
        let (manager, _events) = ConnectionManager::new(test_config());
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert!(!manager.is_open());
    }

    #[tokio::test]
    async fn test_send_while_not_open_is_dropped() {
        let (manager, _events) = ConnectionManager::new(test_config());
        // Must not panic or queue anything
        manager.send(ClientMessage::Ping);
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_is_terminal() {
        let (manager, _events) = ConnectionManager::new(test_config());
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Closed);

        // A subsequent connect() is a no-op
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_failed_dial_transitions_to_closed() {
        let (manager, _events) = ConnectionManager::new(test_config());
        manager.connect();
        // Give the dial and the single scheduled retry time to fail
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_pruned() {
        let (manager, _events) = ConnectionManager::new(test_config());
        for _ in 0..5 {
            manager.connect();
            // Let the dial fail and any reconnect timer expire
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        // Failed dials and expired timers must not accumulate handles
        assert!(manager.inner.tasks.lock().len() <= 2);
    }

    #[tokio::test]
    async fn test_disconnect_racing_dial_never_reports_open() {
        // A real listener so the dial would succeed if allowed to finish
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                });
            }
        });

        let config = ConnectionConfig {
            url: format!("ws://{addr}/ws/widget/test"),
            ..test_config()
        };
        let (manager, mut events) = ConnectionManager::new(config);
        manager.connect();
        // Shut down before the spawned dial task gets to run
        manager.disconnect();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_dial_emits_no_down_event() {
        // Down signals availability loss; a channel that never opened has
        // nothing to lose
        let (manager, mut events) = ConnectionManager::new(test_config());
        manager.connect();
        tokio::time::sleep(Duration::from_millis(300)).await;
        manager.disconnect();
        assert!(events.try_recv().is_err());
    }
}
