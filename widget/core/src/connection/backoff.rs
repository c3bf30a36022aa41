//! Reconnect Backoff Policy
//!
//! Exponential backoff between reconnection attempts: the delay doubles per
//! attempt starting from a base interval, capped at an upper bound, and the
//! whole sequence is abandoned after a configured attempt count. A successful
//! open resets the counter, so a connection that later drops starts over
//! from the base delay.

use std::time::Duration;

/// Reconnection attempt tracking owned by the connection manager.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    /// Attempts made since the last successful open
    attempts: u32,
    /// Attempts allowed before giving up (0 = reconnection disabled)
    max_attempts: u32,
    /// Delay before the first retry
    base_delay: Duration,
    /// Upper bound on the delay
    max_delay: Duration,
}

impl ReconnectPolicy {
    /// Create a policy with the given backoff parameters
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Attempts made since the last successful open
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay for a given attempt number (1-based): `min(base * 2^(n-1), cap)`
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.base_delay.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Record another attempt and return the delay to wait before it, or
    /// `None` once the attempt budget is exhausted.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay_for(self.attempts))
    }

    /// Reset the attempt counter after a successful open
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Permanently suppress future reconnection (terminal shutdown)
    pub fn disable(&mut self) {
        self.max_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 5)
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(20), Duration::from_secs(30));
    }

    #[test]
    fn test_attempt_budget() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 2);
        assert_eq!(policy.next_attempt(), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_attempt(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_attempt(), None);
        assert_eq!(policy.attempts(), 2);
    }

    #[test]
    fn test_reset_restarts_from_base() {
        let mut policy = policy();
        policy.next_attempt();
        policy.next_attempt();
        assert_eq!(policy.attempts(), 2);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        // Next sequence starts from the base delay again
        assert_eq!(policy.next_attempt(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_disable_is_terminal() {
        let mut policy = policy();
        policy.disable();
        assert_eq!(policy.next_attempt(), None);
        policy.reset();
        assert_eq!(policy.next_attempt(), None);
    }

    #[test]
    fn test_overflow_saturates_at_cap() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(30), u32::MAX);
        assert_eq!(policy.delay_for(64), Duration::from_secs(30));
    }
}
