//! Wire Protocol
//!
//! JSON message shapes exchanged with the chat backend, for both delivery
//! paths:
//!
//! - The live channel carries [`ClientMessage`] out and [`ServerMessage`] in,
//!   one JSON object per WebSocket text frame, discriminated by a `type` field.
//! - The fallback path is a single POST carrying [`FallbackRequest`] and
//!   returning [`FallbackReply`].
//!
//! # Noise Tolerance
//!
//! Inbound frames that fail to parse (malformed JSON, unknown `type`, missing
//! fields) are dropped silently by [`parse_inbound`]. The server is trusted to
//! be well-behaved; defensive parsing just keeps a stray frame from taking
//! down the whole session.

use serde::{Deserialize, Serialize};

/// A supporting document reference attached to a finalized assistant reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Document name the excerpt was retrieved from
    pub document: String,
    /// Chunk index within the document
    #[serde(default)]
    pub chunk_index: u32,
    /// Relevance score assigned by the retriever
    #[serde(default)]
    pub score: f32,
}

/// Messages sent from the widget to the server over the live channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A user submission
    Message {
        /// The user's message text
        content: String,
        /// Conversation correlation id, once the server has assigned one
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    /// Liveness signal, no payload. Fire-and-forget; no pong is awaited.
    Ping,
}

/// Messages received from the server over the live channel.
///
/// The fallback path synthesizes the same sequence locally, so the
/// controller never needs to know which path served a reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A new assistant reply is starting
    StreamStart {
        /// Server-assigned id for the reply being streamed
        message_id: String,
    },
    /// A content delta for an in-flight reply
    StreamChunk {
        /// Id of the reply this chunk belongs to
        message_id: String,
        /// The delta text, appended verbatim in arrival order
        content: String,
    },
    /// An in-flight reply is complete
    StreamEnd {
        /// Id of the reply that completed
        message_id: String,
        /// Conversation correlation id to attach to subsequent submissions
        #[serde(default)]
        conversation_id: Option<String>,
        /// Supporting document references
        #[serde(default)]
        sources: Vec<Source>,
        /// Classification tag for the exchange (e.g. `faq`, `order_status`)
        #[serde(default)]
        intent: Option<String>,
    },
    /// Server-reported error; terminates any in-flight reply
    Error {
        /// Human-readable error text, surfaced as an assistant turn
        message: String,
    },
    /// Out-of-band system notice (e.g. an agent joined the conversation)
    System {
        /// Notice text
        content: String,
        /// Optional machine-readable event tag (e.g. `agent_joined`)
        #[serde(default)]
        event: Option<String>,
    },
}

/// Body of the one-shot fallback POST.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FallbackRequest {
    /// The user's message text
    pub content: String,
    /// Conversation correlation id, if one has been assigned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Optional routing/grouping identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_group_id: Option<String>,
}

/// Response body of the one-shot fallback POST.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FallbackReply {
    /// Conversation correlation id assigned or confirmed by the server
    pub conversation_id: String,
    /// Server-assigned id for the reply, when provided
    #[serde(default)]
    pub message_id: Option<String>,
    /// The full reply text
    pub content: String,
    /// Supporting document references
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Classification tag for the exchange
    #[serde(default)]
    pub intent: Option<String>,
}

/// Parse an inbound text frame, dropping anything malformed.
///
/// Returns `None` for malformed JSON, unknown `type` discriminators, and
/// payloads missing required fields. Callers log at debug level and move on.
#[must_use]
pub fn parse_inbound(raw: &str) -> Option<ServerMessage> {
    serde_json::from_str::<ServerMessage>(raw).ok()
}

/// Derive the live-channel address from the HTTP(S) base address.
///
/// The scheme is swapped for its WebSocket equivalent (`http` → `ws`,
/// `https` → `wss`), the session id becomes a fixed path segment, and the
/// routing identifier rides along as the `sg` query parameter when present.
/// WebSocket routes live at the server root, outside the `/api` prefix the
/// REST endpoints use.
#[must_use]
pub fn channel_url(base_url: &str, session_id: &str, source_group_id: Option<&str>) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    };

    match source_group_id {
        Some(group) => format!("{ws_base}/ws/widget/{session_id}?sg={group}"),
        None => format!("{ws_base}/ws/widget/{session_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::Message {
            content: "hi".to_string(),
            conversation_id: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["content"], "hi");
        // Absent conversation_id is omitted entirely, not serialized as null
        assert!(json.get("conversation_id").is_none());

        let ping = serde_json::to_value(ClientMessage::Ping).unwrap();
        assert_eq!(ping, serde_json::json!({"type": "ping"}));
    }

    #[test]
    fn test_client_message_with_conversation_id() {
        let msg = ClientMessage::Message {
            content: "hi".to_string(),
            conversation_id: Some("c1".to_string()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["conversation_id"], "c1");
    }

    #[test]
    fn test_parse_stream_sequence() {
        let start = parse_inbound(r#"{"type":"stream_start","message_id":"m1"}"#).unwrap();
        assert_eq!(
            start,
            ServerMessage::StreamStart {
                message_id: "m1".to_string()
            }
        );

        let chunk =
            parse_inbound(r#"{"type":"stream_chunk","message_id":"m1","content":"He"}"#).unwrap();
        assert!(matches!(chunk, ServerMessage::StreamChunk { .. }));

        let end = parse_inbound(
            r#"{"type":"stream_end","message_id":"m1","sources":[],"intent":"faq"}"#,
        )
        .unwrap();
        match end {
            ServerMessage::StreamEnd {
                message_id,
                conversation_id,
                sources,
                intent,
            } => {
                assert_eq!(message_id, "m1");
                assert_eq!(conversation_id, None);
                assert!(sources.is_empty());
                assert_eq!(intent.as_deref(), Some("faq"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_sources() {
        let end = parse_inbound(
            r#"{"type":"stream_end","message_id":"m1","conversation_id":"c1",
                "sources":[{"document":"manual.pdf","chunk_index":3,"score":0.92}]}"#,
        )
        .unwrap();
        match end {
            ServerMessage::StreamEnd { sources, .. } => {
                assert_eq!(sources.len(), 1);
                assert_eq!(sources[0].document, "manual.pdf");
                assert_eq!(sources[0].chunk_index, 3);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_drops_noise() {
        // Malformed JSON
        assert!(parse_inbound("{not json").is_none());
        // Not an object
        assert!(parse_inbound("[1,2,3]").is_none());
        // Unknown discriminator
        assert!(parse_inbound(r#"{"type":"telemetry","content":"x"}"#).is_none());
        // Missing required field
        assert!(parse_inbound(r#"{"type":"stream_start"}"#).is_none());
    }

    #[test]
    fn test_parse_system_notice() {
        let msg =
            parse_inbound(r#"{"type":"system","content":"An agent joined","event":"agent_joined"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ServerMessage::System {
                content: "An agent joined".to_string(),
                event: Some("agent_joined".to_string()),
            }
        );

        // The event tag is optional
        let msg = parse_inbound(r#"{"type":"system","content":"Connecting"}"#).unwrap();
        assert!(matches!(msg, ServerMessage::System { event: None, .. }));
    }

    #[test]
    fn test_channel_url_scheme_swap() {
        assert_eq!(
            channel_url("http://localhost:8000", "v1", None),
            "ws://localhost:8000/ws/widget/v1"
        );
        assert_eq!(
            channel_url("https://chat.example.com", "v1", None),
            "wss://chat.example.com/ws/widget/v1"
        );
    }

    #[test]
    fn test_channel_url_routing_query() {
        assert_eq!(
            channel_url("https://chat.example.com/", "v1", Some("g7")),
            "wss://chat.example.com/ws/widget/v1?sg=g7"
        );
    }
}
