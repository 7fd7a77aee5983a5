//! Retry delay policy for transient cycle failures.

use rand::Rng;
use std::time::Duration;

use crate::domain::models::BackoffConfig;

/// Exponential backoff with uniform jitter and a hard cap.
///
/// `delay(attempt) = min(base * 2^attempt + jitter, max_delay)` where jitter
/// is drawn from `[0, jitter_ms)`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    config: BackoffConfig,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl BackoffPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `attempt`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.config.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.config.jitter_ms)
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Delay for `attempt` with an explicit jitter value.
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exponential = self
            .config
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let delay = exponential
            .saturating_add(jitter_ms)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exponential_without_jitter() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_with_jitter(0, 0), Duration::from_millis(1000));
        assert_eq!(policy.delay_with_jitter(1, 0), Duration::from_millis(2000));
        assert_eq!(policy.delay_with_jitter(2, 0), Duration::from_millis(4000));
        assert_eq!(policy.delay_with_jitter(5, 0), Duration::from_millis(32000));
        // 2^6 * 1000 exceeds the cap
        assert_eq!(policy.delay_with_jitter(6, 0), Duration::from_millis(60000));
    }

    #[test]
    fn test_capped_for_huge_attempts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_with_jitter(200, 499), Duration::from_millis(60000));
    }

    #[test]
    fn test_non_decreasing_up_to_cap() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = policy.next_delay(attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            assert!(delay <= Duration::from_millis(60000));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(60000));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy::new(BackoffConfig {
            base_ms: 10,
            max_delay_ms: 1000,
            jitter_ms: 0,
        });
        assert_eq!(policy.next_delay(3), Duration::from_millis(80));
    }

    proptest! {
        #[test]
        fn jitter_stays_within_span(attempt in 0u32..6) {
            let policy = BackoffPolicy::default();
            let floor = 1000u64 * 2u64.pow(attempt);
            let delay = u64::try_from(policy.next_delay(attempt).as_millis()).unwrap();

            prop_assert!(delay <= 60000);
            if floor + 500 <= 60000 {
                prop_assert!(delay >= floor);
                prop_assert!(delay < floor + 500);
            }
        }
    }
}
