//! Reconnection Policy
//!
//! Fixed-delay reconnection for the trade stream. After an unexpected
//! disconnect exactly one attempt is scheduled after the delay; the cycle
//! repeats for as long as the failures continue. There is no backoff and no
//! attempt limit.

use std::time::Duration;

/// Delay before re-attempting a connection after an unexpected disconnect.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Wait before each reconnection attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Create a configuration with a custom delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Fixed-delay reconnection policy.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use trade_stream::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
/// assert_eq!(policy.next_delay(), Duration::from_secs(3));
/// assert_eq!(policy.next_delay(), Duration::from_secs(3));
/// assert_eq!(policy.attempt_count(), 2);
///
/// // Successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. Always the configured delay.
    pub const fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.config.delay
    }

    /// Reset the attempt counter after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts scheduled since the last successful connection.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.config.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_is_three_seconds() {
        assert_eq!(ReconnectConfig::default().delay, Duration::from_secs(3));
    }

    #[test]
    fn delay_never_grows() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(250)));
        for _ in 0..100 {
            assert_eq!(policy.next_delay(), Duration::from_millis(250));
        }
        assert_eq!(policy.attempt_count(), 100);
    }

    #[test]
    fn reset_clears_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.delay(), DEFAULT_RECONNECT_DELAY);
    }
}
