//! Widget Errors
//!
//! Library-level error types. Transport failures are deliberately absent
//! from most public signatures: the connection manager recovers from them
//! internally, and conversation-level failures always resolve to a turn in
//! the transcript rather than an `Err` (see the error taxonomy in the
//! controller docs).

use thiserror::Error;

/// Errors surfaced by widget-core entry points.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// The fallback request failed: network error or non-success status.
    /// The controller converts this into a single synthetic apology turn.
    #[error("fallback request failed: {0}")]
    Fallback(String),

    /// The session bootstrap call failed.
    #[error("session bootstrap failed: {0}")]
    Bootstrap(String),

    /// The controller task has shut down; no further work is accepted.
    #[error("widget has been shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WidgetError::Fallback("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));

        assert!(WidgetError::ShutDown.to_string().contains("shut down"));
    }
}
