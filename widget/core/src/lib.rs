//! Widget Core - Headless Chat Client for Embeddable Support Widgets
//!
//! This crate provides the conversation engine behind an embeddable customer
//! support chat widget, completely independent of any rendering layer. It can
//! drive a web view, a native UI, or run headless for testing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Rendering Layer                          │
//! │            (excluded: consumes ChatEvents only)              │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │
//!                  ChatEvent (up) / submit (down)
//!                             │
//! ┌───────────────────────────┼──────────────────────────────────┐
//! │                      WIDGET CORE                             │
//! │  ┌────────────────────────┴───────────────────────────────┐  │
//! │  │                   ChatController                       │  │
//! │  │  ┌────────────┐  ┌─────────────┐  ┌─────────────────┐  │  │
//! │  │  │ Transcript │  │ Connection  │  │    Fallback     │  │  │
//! │  │  │  + Stream  │  │  Manager    │  │    Client       │  │  │
//! │  │  │  Session   │  │ (WebSocket) │  │  (HTTP POST)    │  │  │
//! │  │  └────────────┘  └──────┬──────┘  └────────┬────────┘  │  │
//! │  └─────────────────────────┼──────────────────┼───────────┘  │
//! └────────────────────────────┼──────────────────┼──────────────┘
//!                              │                  │
//!                        live channel       one-shot request
//!                              │                  │
//!                      ┌───────┴──────────────────┴───────┐
//!                      │           Chat Backend           │
//!                      └──────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatController`]: The actor owning conversation state and both
//!   delivery paths
//! - [`ChatHandle`]: Cloneable surface for the embedding layer (submit,
//!   snapshot, shutdown)
//! - [`ChatEvent`]: Lifecycle events emitted to the rendering layer
//! - [`WidgetConfig`]: Endpoint, session, and timing configuration
//! - [`Turn`]: One exchange unit in the transcript
//! - [`ConnectionManager`]: The live WebSocket channel with keepalive and
//!   backoff reconnection
//!
//! # Quick Start
//!
//! ```ignore
//! use widget_core::{bootstrap, ChatController, ChatEvent, WidgetConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let base_url = "https://chat.example.com";
//!     let session = bootstrap::init_session(base_url, None, Some("en"))
//!         .await
//!         .unwrap();
//!
//!     let config = WidgetConfig::new(base_url, session.visitor_id);
//!     let (handle, mut events) = ChatController::spawn(config);
//!
//!     handle.submit("Where is my order?").await.unwrap();
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ChatEvent::MessageDelta { delta, .. } => print!("{delta}"),
//!             ChatEvent::MessageFinalized(_) => break,
//!             _ => {}
//!         }
//!     }
//!
//!     handle.shutdown();
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`bootstrap`]: One-time session initialization call
//! - [`config`]: Widget configuration and timing knobs
//! - [`connection`]: Live channel management (keepalive, backoff, reconnect)
//! - [`controller`]: The submission state machine and controller actor
//! - [`error`]: Library-level error types
//! - [`events`]: Lifecycle events emitted to the rendering layer
//! - [`fallback`]: One-shot delivery path and the simulated reveal
//! - [`protocol`]: Wire message shapes and address derivation
//! - [`turn`]: Turns, the stream accumulator, and the transcript
//!
//! # No Rendering Dependencies
//!
//! This crate has **zero** dependencies on any UI framework. It's pure
//! conversation logic that any embedding layer can drive.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod events;
pub mod fallback;
pub mod protocol;
pub mod turn;

// Re-exports for convenience
pub use bootstrap::SessionInfo;
pub use config::WidgetConfig;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, LinkEvent};
pub use controller::{ChatController, ChatHandle, SubmitError};
pub use error::WidgetError;
pub use events::ChatEvent;
pub use fallback::{FallbackClient, FALLBACK_APOLOGY};
pub use protocol::{ClientMessage, FallbackReply, FallbackRequest, ServerMessage, Source};
pub use turn::{StreamSession, Transcript, Turn, TurnId, TurnRole};
