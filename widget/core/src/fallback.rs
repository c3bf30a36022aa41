//! Fallback Delivery Path
//!
//! When the live channel is unavailable, a submission is served by a single
//! request/response exchange instead. The full response text is then
//! revealed locally in small randomly sized increments so that the event
//! sequence consumers observe is identical in shape to the live path
//! (start, one or more deltas, finalize).
//!
//! A failed fallback request is never retried; it resolves to exactly one
//! synthetic assistant turn carrying [`FALLBACK_APOLOGY`].

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::WidgetError;
use crate::protocol::{FallbackReply, FallbackRequest};

/// Fixed apology text used when the fallback request itself fails.
pub const FALLBACK_APOLOGY: &str =
    "Sorry, something went wrong on our side. Please try again in a moment.";

/// Turkish variant of the apology, matching the widget's home market.
pub const FALLBACK_APOLOGY_TR: &str =
    "Üzgünüm, şu anda bir sorun oluştu. Lütfen birazdan tekrar deneyin.";

/// Smallest number of characters revealed per simulated tick.
pub const MIN_REVEAL_CHARS: usize = 3;

/// Largest number of characters revealed per simulated tick.
pub const MAX_REVEAL_CHARS: usize = 8;

/// Header carrying the opaque session identifier on fallback requests.
pub const SESSION_HEADER: &str = "X-Visitor-Id";

/// One-shot request client for the fallback path.
#[derive(Clone)]
pub struct FallbackClient {
    base_url: String,
    session_id: String,
    source_group_id: Option<String>,
    http: reqwest::Client,
}

impl FallbackClient {
    /// Create a client for the given backend and session.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        session_id: impl Into<String>,
        source_group_id: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            session_id: session_id.into(),
            source_group_id,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to create HTTP client"),
        }
    }

    fn message_url(&self) -> String {
        format!("{}/api/widget/message", self.base_url.trim_end_matches('/'))
    }

    /// Submit a message over the one-shot path.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::Fallback`] on a network failure or a
    /// non-success status. Callers convert this into a single synthetic
    /// error turn; the request is never retried here.
    pub async fn send(
        &self,
        content: &str,
        conversation_id: Option<&str>,
    ) -> Result<FallbackReply, WidgetError> {
        let body = FallbackRequest {
            content: content.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            source_group_id: self.source_group_id.clone(),
        };

        debug!(url = %self.message_url(), "submitting over fallback path");
        let response = self
            .http
            .post(self.message_url())
            .header(SESSION_HEADER, &self.session_id)
            .json(&body)
            .send()
            .await
            .map_err(|err| WidgetError::Fallback(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WidgetError::Fallback(format!("server returned {status}")));
        }

        response
            .json::<FallbackReply>()
            .await
            .map_err(|err| WidgetError::Fallback(err.to_string()))
    }
}

/// Split `text` into randomly sized reveal chunks of 3–8 characters.
///
/// Chunks cover the text exactly once, in order, and never split a
/// multi-byte character. The final chunk may be shorter than the minimum
/// when the remainder runs out.
#[must_use]
pub fn reveal_chunks(text: &str) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let want = rng.gen_range(MIN_REVEAL_CHARS..=MAX_REVEAL_CHARS);
        let split = rest
            .char_indices()
            .nth(want)
            .map_or(rest.len(), |(index, _)| index);
        let (head, tail) = rest.split_at(split);
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}
