//! Retry policy: decides backoff delays for failed reconcile requests.

use std::time::Duration;

use super::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

    pub fn new(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `attempts` (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// Example with base_delay=100ms, multiplier=2.0: 100ms, 200ms, 400ms, ...
    ///
    /// Capped at `max_delay`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(Duration::from_millis(config.base_delay_ms), config.multiplier)
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::new(Duration::from_secs(2), 2.0);

        let d1 = policy.next_delay(1);
        let d2 = policy.next_delay(2);
        let d3 = policy.next_delay(3);

        assert_eq!(d1, Duration::from_secs(2));
        assert_eq!(d2, Duration::from_secs(4));
        assert_eq!(d3, Duration::from_secs(8));
    }

    #[test]
    fn attempt_zero_uses_base_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(100), 3.0);
        assert_eq!(policy.next_delay(0), Duration::from_millis(100));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 10.0)
            .with_max_delay(Duration::from_secs(60));

        assert_eq!(policy.next_delay(2), Duration::from_secs(10));
        assert_eq!(policy.next_delay(3), Duration::from_secs(60));
        assert_eq!(policy.next_delay(21), Duration::from_secs(60));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn config_max_delay_is_carried_over() {
        let config = RetryConfig {
            max_delay_ms: 1_500,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_delay, Duration::from_millis(1_500));
        assert_eq!(policy.next_delay(30), Duration::from_millis(1_500));
    }
}
