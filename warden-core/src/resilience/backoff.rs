//! Exponential backoff for retry logic
//!
//! Pure attempt-to-delay mapping used by the connection manager between
//! reconnection attempts. Deterministic and monotonically non-decreasing,
//! clamped to `[base, max]`.

use std::time::Duration;

/// Exponential backoff policy.
///
/// `delay(attempt)` grows multiplicatively from `base` and saturates at
/// `max`. The policy itself holds no mutable state; callers track the
/// attempt count.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Cap on delay growth
    pub max: Duration,
    /// Multiplier applied per attempt (typically 2.0)
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Fast retries for tests and local development.
    pub fn aggressive() -> Self {
        Self {
            base: Duration::from_millis(10),
            max: Duration::from_secs(1),
            factor: 1.5,
        }
    }

    /// Slow retries for production deployments.
    pub fn conservative() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
        }
    }

    /// Delay to wait before retry number `attempt` (zero-based).
    ///
    /// Pure: no side effects, no failure modes.
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base;
        for _ in 0..attempt {
            if delay >= self.max {
                break;
            }
            delay = Duration::from_secs_f64(delay.as_secs_f64() * self.factor).min(self.max);
        }
        delay.clamp(self.base.min(self.max), self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_attempt_is_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), policy.base);
    }

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(100),
            factor: 2.0,
        };

        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_saturates_at_max() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(100),
            factor: 2.0,
        };

        assert_eq!(policy.delay(20), Duration::from_millis(100));
        assert_eq!(policy.delay(1000), Duration::from_millis(100));
    }

    #[test]
    fn test_factor_below_one_still_clamped_to_base() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            factor: 0.5,
        };

        // A shrinking factor must not drop below base
        assert_eq!(policy.delay(5), Duration::from_millis(100));
    }

    #[test]
    fn test_presets() {
        let aggressive = BackoffPolicy::aggressive();
        let conservative = BackoffPolicy::conservative();
        assert!(aggressive.base < conservative.base);
        assert!(aggressive.max < conservative.max);
    }

    proptest! {
        #[test]
        fn prop_monotonic_and_bounded(attempt in 0u32..64) {
            let policy = BackoffPolicy::default();
            let d0 = policy.delay(attempt);
            let d1 = policy.delay(attempt + 1);

            prop_assert!(d0 <= d1);
            prop_assert!(d0 >= policy.base);
            prop_assert!(d1 <= policy.max);
        }
    }
}
