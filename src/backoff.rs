/// Retry spacing for LLM calls.
///
/// A policy is a fixed attempt budget plus the delay to wait after each
/// failed attempt. With a multiplier of 1 the delay stays constant, which
/// is what step calls use; larger multipliers grow it up to `max_delay`.
use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }

    pub fn exponential(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..attempt {
            delay = delay
                .checked_mul(self.multiplier)
                .map_or(self.max_delay, |d| d.min(self.max_delay));
        }
        delay
    }

    /// Returns true if another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        if config.multiplier <= 1 {
            Self::fixed(config.max_attempts, config.delay())
        } else {
            Self::exponential(
                config.max_attempts,
                config.delay(),
                config.max_delay(),
                config.multiplier,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_is_constant() {
        let p = RetryPolicy::fixed(3, Duration::from_secs(1));
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(1));
        assert_eq!(p.delay_after(10), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_growth() {
        let p = RetryPolicy::exponential(
            5,
            Duration::from_secs(2),
            Duration::from_secs(60),
            2,
        );
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(4));
        assert_eq!(p.delay_after(3), Duration::from_secs(8));
        assert_eq!(p.delay_after(4), Duration::from_secs(16));
    }

    #[test]
    fn test_max_delay_cap() {
        let p = RetryPolicy::exponential(
            10,
            Duration::from_secs(2),
            Duration::from_secs(10),
            2,
        );
        assert_eq!(p.delay_after(3), Duration::from_secs(8));
        // 8 * 2 = 16, capped at 10
        assert_eq!(p.delay_after(4), Duration::from_secs(10));
        assert_eq!(p.delay_after(7), Duration::from_secs(10));
    }

    #[test]
    fn test_huge_config_values_saturate_at_max_delay() {
        let config = RetryConfig {
            max_attempts: 3,
            delay_ms: 10_000_000_000_000_000_000,
            multiplier: 10_000,
            max_delay_ms: u64::MAX,
        };
        let p = RetryPolicy::from(&config);
        assert_eq!(p.delay_after(1), Duration::from_millis(10_000_000_000_000_000_000));
        assert_eq!(p.delay_after(2), Duration::from_millis(u64::MAX));
        assert_eq!(p.delay_after(5), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_should_retry_budget() {
        let p = RetryPolicy::fixed(3, Duration::ZERO);
        assert!(p.should_retry(1));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }

    #[test]
    fn test_from_config_fixed() {
        let config = RetryConfig {
            max_attempts: 4,
            delay_ms: 500,
            multiplier: 1,
            max_delay_ms: 30_000,
        };
        let p = RetryPolicy::from(&config);
        assert_eq!(p.max_attempts, 4);
        assert_eq!(p.delay_after(3), Duration::from_millis(500));
    }

    #[test]
    fn test_from_config_exponential() {
        let config = RetryConfig {
            max_attempts: 4,
            delay_ms: 500,
            multiplier: 3,
            max_delay_ms: 2_000,
        };
        let p = RetryPolicy::from(&config);
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1_500));
        assert_eq!(p.delay_after(3), Duration::from_millis(2_000));
    }
}
