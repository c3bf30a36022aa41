//! Widget Configuration
//!
//! Everything the embedding layer hands to the core: the endpoint address,
//! the opaque session identifier from the bootstrap call, the optional
//! routing identifier, and the timing knobs for keepalive, reconnection,
//! and the simulated reveal.

use std::time::Duration;

/// Configuration for a widget instance.
#[derive(Clone, Debug)]
pub struct WidgetConfig {
    /// Base HTTP(S) address of the chat backend
    pub base_url: String,
    /// Opaque session identifier from the bootstrap call (visitor id)
    pub session_id: String,
    /// Optional routing/grouping identifier
    pub source_group_id: Option<String>,
    /// Interval between keepalive pings while the live channel is open
    /// (default: 30 seconds)
    pub keepalive_interval: Duration,
    /// Base delay for reconnect backoff (default: 1 second)
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect backoff delay (default: 30 seconds)
    pub reconnect_cap: Duration,
    /// Reconnect attempts before giving up (default: 5)
    pub max_reconnect_attempts: u32,
    /// Interval between simulated-reveal chunks on the fallback path
    /// (default: 30 milliseconds)
    pub reveal_interval: Duration,
    /// Optional deadline for a submission stuck waiting for a stream to
    /// start. `None` leaves timeout policy to the integrating layer.
    pub submit_timeout: Option<Duration>,
}

impl WidgetConfig {
    /// Create a config with default timing for the given endpoint and session
    #[must_use]
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_id: session_id.into(),
            source_group_id: None,
            keepalive_interval: Duration::from_secs(30),
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            reveal_interval: Duration::from_millis(30),
            submit_timeout: None,
        }
    }

    /// Set the routing/grouping identifier
    #[must_use]
    pub fn with_source_group(mut self, source_group_id: impl Into<String>) -> Self {
        self.source_group_id = Some(source_group_id.into());
        self
    }

    /// Set the keepalive ping interval
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the reconnect backoff parameters
    #[must_use]
    pub fn with_reconnect(mut self, base: Duration, cap: Duration, max_attempts: u32) -> Self {
        self.reconnect_base = base;
        self.reconnect_cap = cap;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Set the simulated-reveal interval
    #[must_use]
    pub fn with_reveal_interval(mut self, interval: Duration) -> Self {
        self.reveal_interval = interval;
        self
    }

    /// Set the submission deadline (time allowed for a stream to start)
    #[must_use]
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = Some(timeout);
        self
    }

    /// Create a config with short intervals suitable for tests
    #[must_use]
    pub fn for_testing(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            reconnect_base: Duration::from_millis(20),
            reconnect_cap: Duration::from_millis(100),
            max_reconnect_attempts: 2,
            keepalive_interval: Duration::from_millis(200),
            reveal_interval: Duration::from_millis(1),
            ..Self::new(base_url, session_id)
        }
    }
}
