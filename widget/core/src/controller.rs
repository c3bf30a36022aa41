//! Streaming Session Controller
//!
//! Translates inbound protocol events and outbound user intent into turn
//! lifecycle transitions, choosing between the live transport and the
//! one-shot fallback request, and guaranteeing each submission yields
//! exactly one finalized assistant turn (or exactly one error turn).
//!
//! # Structure
//!
//! - [`ChatState`] is the pure per-submission state machine. It owns the
//!   transcript and emits [`ChatEvent`]s; it has no I/O and no timers.
//! - [`ChatController`] is the actor that drives [`ChatState`] from a single
//!   `select!` loop over the command channel, the live link, and the
//!   simulated-delivery feed. All mutation is sequential inside this loop,
//!   so no locking is needed around conversation state.
//! - [`ChatHandle`] is the cloneable public surface handed to the embedding
//!   layer: submit a message, snapshot the transcript, shut down.
//!
//! # Delivery Channels
//!
//! Both delivery paths feed the same inbox of [`ServerMessage`]s: the live
//! link forwards frames as they arrive, and the fallback path synthesizes
//! the identical start/chunk/end sequence from its one-shot response. The
//! state machine is oblivious to which channel is active, which is what
//! makes the public event contract path-independent.
//!
//! # Error Taxonomy
//!
//! - Transport failure: recovered by the connection manager's own backoff
//!   loop; surfaced only as a `ConnectionChanged` status signal, never as a
//!   turn, and it does not fail an in-flight submission by itself.
//! - Protocol error (`error` frame): one assistant turn carrying the
//!   server-supplied text; terminates the current stream session.
//! - Fallback failure: one synthetic assistant turn carrying the fixed
//!   apology text; never retried.
//! - Malformed inbound payloads: dropped before they reach this module.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::WidgetConfig;
use crate::connection::{ConnectionConfig, ConnectionManager, LinkEvent};
use crate::error::WidgetError;
use crate::events::ChatEvent;
use crate::fallback::{self, FallbackClient, FALLBACK_APOLOGY};
use crate::protocol::{self, ClientMessage, FallbackReply, ServerMessage};
use crate::turn::{Transcript, Turn, TurnId};

/// Error turn text used when a configured submission deadline expires.
pub const SUBMIT_TIMEOUT_TEXT: &str =
    "The assistant did not respond in time. Please try again.";

/// Why a submission was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// A submission is already in flight. Nothing is queued and no user
    /// turn is appended; the caller must wait for the current turn to
    /// resolve.
    #[error("a submission is already in flight")]
    Busy,
    /// The controller has shut down.
    #[error("widget has been shut down")]
    ShutDown,
}

/// Where the submission cycle currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// No submission in flight; input accepted
    Idle,
    /// User turn sent, waiting for a stream to start
    Awaiting,
    /// A stream session is open and accumulating
    Streaming,
}

/// What the actor must do to carry a submission forward.
#[derive(Debug, PartialEq)]
enum SubmitAction {
    /// Transmit over the open live channel
    SendLive(ClientMessage),
    /// Issue the one-shot fallback request
    Fallback {
        content: String,
        conversation_id: Option<String>,
    },
}

/// The pure submission state machine. No I/O, no timers; it consumes
/// protocol messages and user intent, mutates the transcript, and emits
/// lifecycle events.
struct ChatState {
    transcript: Transcript,
    phase: Phase,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatState {
    fn new(events: mpsc::UnboundedSender<ChatEvent>) -> Self {
        Self {
            transcript: Transcript::new(),
            phase: Phase::Idle,
            events,
        }
    }

    fn emit(&self, event: ChatEvent) {
        // The embedding layer dropping its receiver must not fail the core
        let _ = self.events.send(event);
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn turns(&self) -> &[Turn] {
        self.transcript.turns()
    }

    fn conversation_id(&self) -> Option<String> {
        self.transcript.conversation_id().map(str::to_string)
    }

    fn connection_changed(&self, connected: bool) {
        self.emit(ChatEvent::ConnectionChanged { connected });
    }

    /// Accept a user submission, append its turn, and decide the delivery
    /// channel for this cycle. Rejects with [`SubmitError::Busy`] while a
    /// cycle is in flight.
    fn submit(&mut self, text: &str, link_open: bool) -> Result<SubmitAction, SubmitError> {
        if self.phase != Phase::Idle {
            return Err(SubmitError::Busy);
        }
        let turn = self.transcript.push_user(text);
        self.emit(ChatEvent::TurnAppended(turn));
        self.phase = Phase::Awaiting;

        let conversation_id = self.conversation_id();
        if link_open {
            Ok(SubmitAction::SendLive(ClientMessage::Message {
                content: text.to_string(),
                conversation_id,
            }))
        } else {
            Ok(SubmitAction::Fallback {
                content: text.to_string(),
                conversation_id,
            })
        }
    }

    /// Apply one inbound protocol message, regardless of which delivery
    /// channel produced it.
    fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::StreamStart { message_id } => {
                // Answers a pending submission, or arrives unsolicited when
                // a human agent replies to an idle widget
                if self.phase == Phase::Streaming {
                    debug!(%message_id, "ignoring stream_start while a stream is open");
                    return;
                }
                if let Some(turn) = self.transcript.begin_streaming(TurnId::from(message_id)) {
                    self.phase = Phase::Streaming;
                    self.emit(ChatEvent::MessageStarted { id: turn.id });
                }
            }
            ServerMessage::StreamChunk {
                message_id,
                content,
            } => {
                let id = TurnId::from(message_id);
                if self.transcript.append_streaming(&id, &content) {
                    self.emit(ChatEvent::MessageDelta { id, delta: content });
                }
                // An unmatched id is protocol noise, not an error
            }
            ServerMessage::StreamEnd {
                message_id,
                conversation_id,
                sources,
                intent,
            } => {
                let id = TurnId::from(message_id);
                if let Some(turn) =
                    self.transcript
                        .finish_streaming(&id, conversation_id, sources, intent)
                {
                    self.phase = Phase::Idle;
                    self.emit(ChatEvent::MessageFinalized(turn));
                }
            }
            ServerMessage::Error { message } => self.fail(&message),
            ServerMessage::System { content, event } => {
                let turn = self.transcript.push_system(content.clone());
                self.emit(ChatEvent::TurnAppended(turn));
                self.emit(ChatEvent::SystemNotice { content, event });
            }
        }
    }

    /// Resolve the current cycle (if any) to a single error turn and
    /// re-enable submission.
    fn fail(&mut self, text: &str) {
        match self.transcript.fail_streaming(text) {
            // The turn already started streaming: close its cycle
            Some(turn) => self.emit(ChatEvent::MessageFinalized(turn)),
            // No open session: surface a standalone assistant turn
            None => {
                let turn = self.transcript.push_error(text);
                self.emit(ChatEvent::TurnAppended(turn));
            }
        }
        self.phase = Phase::Idle;
    }
}

/// Commands from the handle to the actor.
enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<(), SubmitError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Turn>>,
    },
    ConversationId {
        reply: oneshot::Sender<Option<String>>,
    },
    Shutdown,
}

/// Cloneable public surface of a widget instance.
///
/// Returned by [`ChatController::spawn`]; there is no ambient global
/// instance. Dropping every handle shuts the controller down.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ChatHandle {
    /// Submit a user message.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Busy`] while a previous submission is still
    /// in flight, or [`SubmitError::ShutDown`] after shutdown.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), SubmitError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                text: text.into(),
                reply,
            })
            .map_err(|_| SubmitError::ShutDown)?;
        response.await.map_err(|_| SubmitError::ShutDown)?
    }

    /// Copy of the transcript at this moment.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::ShutDown`] after shutdown.
    pub async fn snapshot(&self) -> Result<Vec<Turn>, WidgetError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply })
            .map_err(|_| WidgetError::ShutDown)?;
        response.await.map_err(|_| WidgetError::ShutDown)
    }

    /// The stored conversation identifier, once the server has assigned one.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::ShutDown`] after shutdown.
    pub async fn conversation_id(&self) -> Result<Option<String>, WidgetError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::ConversationId { reply })
            .map_err(|_| WidgetError::ShutDown)?;
        response.await.map_err(|_| WidgetError::ShutDown)
    }

    /// Terminal shutdown: closes the transport, cancels every timer, and
    /// stops all event emission. There is no partial or resumable variant.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// The actor owning conversation state, the connection manager, and the
/// fallback client.
pub struct ChatController {
    config: WidgetConfig,
    state: ChatState,
    connection: ConnectionManager,
    fallback: FallbackClient,
    reveal_task: Option<JoinHandle<()>>,
}

impl ChatController {
    /// Start a widget instance: dial the live channel and spawn the actor.
    ///
    /// Returns the handle for the embedding layer plus the receiver its
    /// rendering layer consumes lifecycle events from.
    #[must_use]
    pub fn spawn(config: WidgetConfig) -> (ChatHandle, mpsc::UnboundedReceiver<ChatEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let url = protocol::channel_url(
            &config.base_url,
            &config.session_id,
            config.source_group_id.as_deref(),
        );
        let (connection, link_rx) = ConnectionManager::new(ConnectionConfig {
            url,
            keepalive_interval: config.keepalive_interval,
            reconnect_base: config.reconnect_base,
            reconnect_cap: config.reconnect_cap,
            max_reconnect_attempts: config.max_reconnect_attempts,
        });
        connection.connect();

        let fallback = FallbackClient::new(
            config.base_url.clone(),
            config.session_id.clone(),
            config.source_group_id.clone(),
        );

        let controller = Self {
            state: ChatState::new(event_tx),
            connection,
            fallback,
            config,
            reveal_task: None,
        };
        tokio::spawn(controller.run(command_rx, link_rx));

        (
            ChatHandle {
                commands: command_tx,
            },
            event_rx,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut link: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        // Both delivery channels converge on this feed; the live link is
        // merged in directly below, the fallback task synthesizes into it.
        let (feed_tx, mut feed) = mpsc::unbounded_channel::<ServerMessage>();
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit { text, reply }) => {
                        let result = self.handle_submit(&text, &feed_tx);
                        if result.is_ok() {
                            deadline = self
                                .config
                                .submit_timeout
                                .map(|timeout| Instant::now() + timeout);
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Snapshot { reply }) => {
                        let _ = reply.send(self.state.turns().to_vec());
                    }
                    Some(Command::ConversationId { reply }) => {
                        let _ = reply.send(self.state.conversation_id());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = link.recv() => match event {
                    LinkEvent::Up => self.state.connection_changed(true),
                    LinkEvent::Down => self.state.connection_changed(false),
                    LinkEvent::Inbound(message) => self.state.apply(message),
                },
                Some(message) = feed.recv() => self.state.apply(message),
                () = wait_until(deadline), if deadline.is_some() => {
                    deadline = None;
                    if self.state.phase() == Phase::Awaiting {
                        warn!("submission timed out waiting for a stream to start");
                        // A late fallback reply must not resolve the
                        // submission a second time
                        if let Some(task) = self.reveal_task.take() {
                            task.abort();
                        }
                        self.state.fail(SUBMIT_TIMEOUT_TEXT);
                    }
                }
            }

            // The deadline only guards the gap before a stream starts
            if self.state.phase() != Phase::Awaiting {
                deadline = None;
            }
        }

        // Terminal teardown: close the transport and stop every timer so
        // nothing is emitted after shutdown.
        self.connection.disconnect();
        if let Some(task) = self.reveal_task.take() {
            task.abort();
        }
    }

    /// Carry one accepted submission: live send, or fallback request plus
    /// simulated reveal. The channel is chosen once, here.
    fn handle_submit(
        &mut self,
        text: &str,
        feed: &mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<(), SubmitError> {
        let link_open = self.connection.is_open();
        match self.state.submit(text, link_open)? {
            SubmitAction::SendLive(message) => self.connection.send(message),
            SubmitAction::Fallback {
                content,
                conversation_id,
            } => {
                debug!("live channel unavailable, taking fallback path");
                let client = self.fallback.clone();
                let feed = feed.clone();
                let interval = self.config.reveal_interval;
                self.reveal_task = Some(tokio::spawn(async move {
                    match client.send(&content, conversation_id.as_deref()).await {
                        Ok(reply) => simulate_stream(reply, interval, &feed).await,
                        Err(err) => {
                            warn!(error = %err, "fallback request failed");
                            let _ = feed.send(ServerMessage::Error {
                                message: FALLBACK_APOLOGY.to_string(),
                            });
                        }
                    }
                }));
            }
        }
        Ok(())
    }
}

/// Reveal a fallback reply through the shared feed as the same
/// start/chunk/end sequence the live channel would produce.
async fn simulate_stream(
    reply: FallbackReply,
    interval: Duration,
    feed: &mpsc::UnboundedSender<ServerMessage>,
) {
    let message_id = reply.message_id.unwrap_or_else(|| TurnId::local().0);
    if feed
        .send(ServerMessage::StreamStart {
            message_id: message_id.clone(),
        })
        .is_err()
    {
        return;
    }
    for chunk in fallback::reveal_chunks(&reply.content) {
        tokio::time::sleep(interval).await;
        if feed
            .send(ServerMessage::StreamChunk {
                message_id: message_id.clone(),
                content: chunk,
            })
            .is_err()
        {
            return;
        }
    }
    let _ = feed.send(ServerMessage::StreamEnd {
        message_id,
        conversation_id: Some(reply.conversation_id),
        sources: reply.sources,
        intent: reply.intent,
    });
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
