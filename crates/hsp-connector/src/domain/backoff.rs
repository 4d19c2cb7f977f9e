//! Reconnection backoff policy.
//!
//! Extracted from the connect path so the delay schedule is a plain value
//! that can be tested without a transport or a clock.

use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff with optional jitter.
///
/// Attempt `n` (zero-based) waits `base * multiplier^n`, capped at `cap`,
/// with up to `jitter` fraction of the delay added or removed.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub cap_ms: u64,
    pub multiplier: f64,
    /// Jitter fraction in `[0.0, 1.0]`; `0.0` makes the schedule
    /// deterministic.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            cap_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Policy from the connector configuration values.
    #[must_use]
    pub fn new(base_delay_ms: u64, cap_ms: u64, multiplier: f64, jitter: f64) -> Self {
        Self {
            base_delay_ms,
            cap_ms,
            multiplier,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Deterministic delay for a zero-based attempt number (no jitter).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = (self.base_delay_ms as f64) * self.multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.cap_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Delay for an attempt with jitter applied, still capped.
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base = self.delay_for_attempt(attempt).as_millis() as f64;
        if self.jitter <= f64::EPSILON {
            return Duration::from_millis(base as u64);
        }
        let spread = base * self.jitter;
        let jittered = rng.gen_range((base - spread).max(0.0)..=(base + spread));
        Duration::from_millis(jittered.min(self.cap_ms as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_exponentially() {
        let policy = BackoffPolicy::new(100, 10_000, 2.0, 0.0);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delays_are_capped() {
        let policy = BackoffPolicy::new(100, 1_000, 2.0, 0.0);
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(1_000));
        // Large exponents must not overflow into nonsense.
        assert_eq!(policy.delay_for_attempt(63), Duration::from_millis(1_000));
    }

    #[test]
    fn test_delays_strictly_increase_until_cap() {
        let policy = BackoffPolicy::new(250, 30_000, 2.0, 0.0);
        let mut previous = Duration::ZERO;
        for attempt in 0..7 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay > previous, "attempt {attempt} did not increase");
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = BackoffPolicy::new(1_000, 30_000, 2.0, 0.25);
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let delay = policy.jittered_delay(0, &mut rng).as_millis() as u64;
            assert!((750..=1_250).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy::new(500, 30_000, 2.0, 0.0);
        let mut rng = rand::thread_rng();
        assert_eq!(
            policy.jittered_delay(2, &mut rng),
            Duration::from_millis(2_000)
        );
    }
}
