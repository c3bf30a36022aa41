//! Session Bootstrap
//!
//! One-time initialization call made before a widget instance is spawned.
//! The backend mints (or recognizes) the opaque visitor id that both
//! delivery paths authenticate with, and returns the localized welcome
//! message the embedding layer may render as an initial system turn.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WidgetError;

#[derive(Serialize)]
struct InitRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source_group_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lang: Option<&'a str>,
}

/// What the backend hands back from the bootstrap call.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionInfo {
    /// Opaque session identifier, used as [`WidgetConfig::session_id`]
    ///
    /// [`WidgetConfig::session_id`]: crate::config::WidgetConfig::session_id
    pub visitor_id: String,
    /// Localized welcome text, when the backend provides one
    #[serde(default)]
    pub welcome_message: Option<String>,
}

fn init_url(base_url: &str) -> String {
    format!("{}/api/widget/init", base_url.trim_end_matches('/'))
}

/// Initialize a session against the backend.
///
/// `lang` is a BCP 47 language tag hint (e.g. `"tr"`, `"en"`) for the
/// welcome message; the backend falls back to its default locale when
/// omitted or unrecognized.
///
/// # Errors
///
/// Returns [`WidgetError::Bootstrap`] on a network failure, a non-success
/// status, or an unparseable response body.
pub async fn init_session(
    base_url: &str,
    source_group_id: Option<&str>,
    lang: Option<&str>,
) -> Result<SessionInfo, WidgetError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|err| WidgetError::Bootstrap(err.to_string()))?;

    let url = init_url(base_url);
    debug!(url = %url, "initializing widget session");
    let response = http
        .post(&url)
        .json(&InitRequest {
            source_group_id,
            lang,
        })
        .send()
        .await
        .map_err(|err| WidgetError::Bootstrap(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(WidgetError::Bootstrap(format!("server returned {status}")));
    }

    response
        .json::<SessionInfo>()
        .await
        .map_err(|err| WidgetError::Bootstrap(err.to_string()))
}
