//! Conversation Data Model
//!
//! Turns, the transient stream accumulator, and the transcript that both
//! delivery paths mutate. The controller is the sole mutator; once a turn is
//! finalized it is never edited again.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::Source;

/// Unique identifier for a turn.
///
/// Assistant turn ids are assigned by the server (`stream_start.message_id`);
/// user and system turns get a locally generated id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    /// Generate a fresh local id for a user or system turn
    #[must_use]
    pub fn local() -> Self {
        Self(format!("local_{}", Uuid::new_v4().simple()))
    }
}

impl From<String> for TurnId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The visitor typing into the widget
    User,
    /// The remote assistant
    Assistant,
    /// Out-of-band notices (agent joined, queue position, ...)
    System,
}

/// One exchange unit in the conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    /// Unique id within the conversation for this widget instance
    pub id: TurnId,
    /// Who authored the turn
    pub role: TurnRole,
    /// Full text content (empty while an assistant turn is accumulating)
    pub content: String,
    /// Supporting document references, attached on finalize
    pub sources: Vec<Source>,
    /// Classification tag, attached on finalize
    pub intent: Option<String>,
    /// Creation time, Unix timestamp in milliseconds
    pub created_at: i64,
    /// Whether the turn is still accumulating streamed content
    pub streaming: bool,
}

impl Turn {
    /// Create an empty assistant placeholder that is still accumulating
    #[must_use]
    pub fn streaming_placeholder(id: TurnId) -> Self {
        Self {
            id,
            role: TurnRole::Assistant,
            content: String::new(),
            sources: Vec::new(),
            intent: None,
            created_at: now_ms(),
            streaming: true,
        }
    }
}

/// Transient accumulator for the assistant turn currently being received.
///
/// At most one exists at a time; it is consumed when the turn finalizes or
/// is superseded by an error.
#[derive(Clone, Debug)]
pub struct StreamSession {
    /// Id of the turn being accumulated
    pub turn_id: TurnId,
    /// Text accumulated so far, in arrival order
    pub buffer: String,
}

impl StreamSession {
    fn new(turn_id: TurnId) -> Self {
        Self {
            turn_id,
            buffer: String::new(),
        }
    }
}

/// The ordered turn list plus the state shared between both delivery paths.
///
/// The conversation identifier lives here because a conversation that starts
/// on one path and continues on the other must stay coherent from the
/// server's perspective.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    conversation_id: Option<String>,
    stream: Option<StreamSession>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The server-assigned conversation identifier, once known
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Whether a stream session is currently open
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Append a completed user turn
    pub fn push_user(&mut self, content: impl Into<String>) -> Turn {
        self.push_completed(TurnRole::User, content.into())
    }

    /// Append a completed system turn
    pub fn push_system(&mut self, content: impl Into<String>) -> Turn {
        self.push_completed(TurnRole::System, content.into())
    }

    /// Append a completed assistant turn carrying error text
    pub fn push_error(&mut self, content: impl Into<String>) -> Turn {
        self.push_completed(TurnRole::Assistant, content.into())
    }

    fn push_completed(&mut self, role: TurnRole, content: String) -> Turn {
        let turn = Turn {
            id: TurnId::local(),
            role,
            content,
            sources: Vec::new(),
            intent: None,
            created_at: now_ms(),
            streaming: false,
        };
        self.turns.push(turn.clone());
        turn
    }

    /// Open a stream session and append its placeholder assistant turn.
    ///
    /// Returns `None` without mutating anything if a session is already
    /// active; a second concurrent session is never created.
    pub fn begin_streaming(&mut self, turn_id: TurnId) -> Option<Turn> {
        if self.stream.is_some() {
            return None;
        }
        let turn = Turn::streaming_placeholder(turn_id.clone());
        self.stream = Some(StreamSession::new(turn_id));
        self.turns.push(turn.clone());
        Some(turn)
    }

    /// Append a delta to the active session's buffer.
    ///
    /// Returns `false` (and mutates nothing) when `turn_id` does not match
    /// the active session; an unmatched id is protocol noise, not an error.
    pub fn append_streaming(&mut self, turn_id: &TurnId, delta: &str) -> bool {
        match self.stream {
            Some(ref mut session) if session.turn_id == *turn_id => {
                session.buffer.push_str(delta);
                true
            }
            _ => false,
        }
    }

    /// Finalize the active session: copy the accumulated text into the turn,
    /// attach sources and tag, store the conversation id, and clear the
    /// session. Returns the finalized turn, or `None` for an unmatched id.
    pub fn finish_streaming(
        &mut self,
        turn_id: &TurnId,
        conversation_id: Option<String>,
        sources: Vec<Source>,
        intent: Option<String>,
    ) -> Option<Turn> {
        let matches = self
            .stream
            .as_ref()
            .is_some_and(|session| session.turn_id == *turn_id);
        if !matches {
            return None;
        }
        let session = self.stream.take()?;
        if let Some(id) = conversation_id {
            self.conversation_id = Some(id);
        }
        // Most recent first, in case the server reuses an id across exchanges
        let turn = self
            .turns
            .iter_mut()
            .rev()
            .find(|t| t.id == session.turn_id)?;
        turn.content = session.buffer;
        turn.sources = sources;
        turn.intent = intent;
        turn.streaming = false;
        Some(turn.clone())
    }

    /// Abort the active session, replacing the placeholder's content with
    /// error text. Returns the failed turn, or `None` if no session is open.
    pub fn fail_streaming(&mut self, error_text: &str) -> Option<Turn> {
        let session = self.stream.take()?;
        let turn = self
            .turns
            .iter_mut()
            .rev()
            .find(|t| t.id == session.turn_id)?;
        turn.content = error_text.to_string();
        turn.streaming = false;
        Some(turn.clone())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_turn_id_local_unique() {
        let id1 = TurnId::local();
        let id2 = TurnId::local();
        assert_ne!(id1, id2);
        assert!(id1.0.starts_with("local_"));
    }

    #[test]
    fn test_chunks_concatenate_in_arrival_order() {
        let mut transcript = Transcript::new();
        let id = TurnId::from("m1".to_string());

        transcript.begin_streaming(id.clone()).unwrap();
        assert!(transcript.append_streaming(&id, "He"));
        assert!(transcript.append_streaming(&id, "llo"));
        assert!(transcript.append_streaming(&id, " world"));

        let turn = transcript
            .finish_streaming(&id, Some("c1".to_string()), Vec::new(), None)
            .unwrap();
        assert_eq!(turn.content, "Hello world");
        assert!(!turn.streaming);
        assert_eq!(transcript.conversation_id(), Some("c1"));
    }

    #[test]
    fn test_no_second_session_while_active() {
        let mut transcript = Transcript::new();
        transcript
            .begin_streaming(TurnId::from("m1".to_string()))
            .unwrap();
        assert!(transcript
            .begin_streaming(TurnId::from("m2".to_string()))
            .is_none());
        // The rejected session appended no placeholder
        assert_eq!(transcript.turns().len(), 1);
    }

    #[test]
    fn test_unmatched_id_is_ignored() {
        let mut transcript = Transcript::new();
        let id = TurnId::from("m1".to_string());
        transcript.begin_streaming(id.clone()).unwrap();

        let stale = TurnId::from("m0".to_string());
        assert!(!transcript.append_streaming(&stale, "late"));
        assert!(transcript
            .finish_streaming(&stale, None, Vec::new(), None)
            .is_none());

        // The active session is untouched
        assert!(transcript.is_streaming());
        assert!(transcript.append_streaming(&id, "ok"));
    }

    #[test]
    fn test_fail_streaming_replaces_content() {
        let mut transcript = Transcript::new();
        let id = TurnId::from("m1".to_string());
        transcript.begin_streaming(id.clone()).unwrap();
        transcript.append_streaming(&id, "partial answ");

        let turn = transcript.fail_streaming("Something went wrong").unwrap();
        assert_eq!(turn.content, "Something went wrong");
        assert!(!turn.streaming);
        assert!(!transcript.is_streaming());
    }

    #[test]
    fn test_fail_streaming_without_session() {
        let mut transcript = Transcript::new();
        assert!(transcript.fail_streaming("oops").is_none());
    }

    #[test]
    fn test_finish_preserves_existing_conversation_id() {
        let mut transcript = Transcript::new();
        let id = TurnId::from("m1".to_string());
        transcript.begin_streaming(id.clone()).unwrap();
        transcript
            .finish_streaming(&id, Some("c1".to_string()), Vec::new(), None)
            .unwrap();

        // A later finalize without a conversation id keeps the stored one
        let id2 = TurnId::from("m2".to_string());
        transcript.begin_streaming(id2.clone()).unwrap();
        transcript
            .finish_streaming(&id2, None, Vec::new(), None)
            .unwrap();
        assert_eq!(transcript.conversation_id(), Some("c1"));
    }

    #[test]
    fn test_push_helpers() {
        let mut transcript = Transcript::new();
        let user = transcript.push_user("hi");
        assert_eq!(user.role, TurnRole::User);
        assert!(!user.streaming);

        let system = transcript.push_system("agent joined");
        assert_eq!(system.role, TurnRole::System);

        let error = transcript.push_error("sorry");
        assert_eq!(error.role, TurnRole::Assistant);
        assert_eq!(transcript.turns().len(), 3);
    }
}
