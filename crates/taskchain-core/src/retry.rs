//! Exponential backoff for automatic retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `delay = base_delay * multiplier^(attempts - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: u32, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: multiplier.max(1),
            max_delay,
        }
    }

    /// Delay before the retry that follows attempt number `attempts` (1-based).
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let factor = self.multiplier.max(1).checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let policy = RetryPolicy::new(Duration::from_millis(100), 2, Duration::from_secs(60));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
    }

    #[test]
    fn test_monotonic_and_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(250), 3, Duration::from_secs(10));
        let delays: Vec<_> = (1..=40).map(|a| policy.delay_for(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(10)));
        assert_eq!(delays.last(), Some(&Duration::from_secs(10)));
    }

    #[test]
    fn test_multiplier_of_one_is_constant() {
        let policy = RetryPolicy::new(Duration::from_millis(50), 0, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), policy.delay_for(7));
    }
}
