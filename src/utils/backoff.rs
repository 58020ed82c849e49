//! Bounded exponential backoff for idempotent exchange requests.

use crate::config::RetryConfig;
use std::time::Duration;

/// Retry budget with exponential delays.
///
/// Formula: min(max_delay, base * 2^retry). No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` counts the first try; zero is clamped to one.
    pub fn new(max_attempts: u32, base: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (0 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp_delay = self.base.saturating_mul(2u32.saturating_pow(retry));
        exp_delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_increases_exponentially() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(60));

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy::new(20, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_from_default_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
    }
}
