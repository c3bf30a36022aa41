//! Lifecycle Events
//!
//! Events emitted upward to the (excluded) rendering layer. The renderer is a
//! dumb consumer: it displays what these events describe and never mutates
//! conversation state itself.
//!
//! # Path Independence
//!
//! A submission served by the live channel and one served by the fallback
//! request produce the same event shape: `MessageStarted`, one or more
//! `MessageDelta`s in arrival order, then `MessageFinalized`. Consumers
//! cannot tell the paths apart from the event sequence alone.

use serde::{Deserialize, Serialize};

use crate::turn::{Turn, TurnId};

/// Events from the controller to the rendering layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ChatEvent {
    /// A completed turn was appended (user input, system notice, or a
    /// synthetic error reply)
    TurnAppended(Turn),

    /// An assistant reply started streaming; a placeholder turn with the
    /// given id is now in the transcript
    MessageStarted {
        /// Id of the turn being accumulated
        id: TurnId,
    },

    /// A content delta arrived for an in-flight reply.
    ///
    /// Deltas are forwarded per chunk in arrival order, never coalesced, so
    /// the consumer can render a live typing effect.
    MessageDelta {
        /// Id of the turn being accumulated
        id: TurnId,
        /// The appended text
        delta: String,
    },

    /// An assistant reply finished; carries the finalized turn
    MessageFinalized(Turn),

    /// Out-of-band system notice
    SystemNotice {
        /// Notice text
        content: String,
        /// Optional machine-readable event tag
        event: Option<String>,
    },

    /// The live channel became available or unavailable.
    ///
    /// Purely a status signal: connectivity changes never fail an in-flight
    /// submission by themselves.
    ConnectionChanged {
        /// Whether the live channel is currently open
        connected: bool,
    },
}

impl ChatEvent {
    /// Short name of the event variant, useful for asserting on event
    /// sequence shapes without comparing payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TurnAppended(_) => "turn_appended",
            Self::MessageStarted { .. } => "message_started",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageFinalized(_) => "message_finalized",
            Self::SystemNotice { .. } => "system_notice",
            Self::ConnectionChanged { .. } => "connection_changed",
        }
    }
}
