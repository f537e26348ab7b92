use rand::Rng;
use std::time::Duration;

/// Reconnection backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied per consecutive failure.
    pub multiplier: f64,
    /// Jitter as a fraction of the computed delay (0.5 means +/-50%).
    pub jitter_factor: f64,
    /// Upper bound for the un-jittered delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.5,
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Exponential backoff with jitter for reconnection attempts.
///
/// Delay for failure N (1-based) is `min(max_delay, base * multiplier^(N-1))`,
/// then shifted by a random jitter in `[-jitter_factor, +jitter_factor]` of itself.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(BackoffConfig::default())
    }
}

impl ExponentialBackoff {
    /// Create a new ExponentialBackoff with a doubling multiplier.
    ///
    /// Negative jitter is clamped to 0, jitter above 1.0 is clamped to 1.0.
    pub fn new(base: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self::from_config(BackoffConfig {
            base,
            multiplier: 2.0,
            jitter_factor,
            max_delay,
        })
    }

    pub fn from_config(config: BackoffConfig) -> Self {
        Self {
            config: BackoffConfig {
                // Clamp to keep gen_range valid and delays non-negative
                jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
                multiplier: config.multiplier.max(1.0),
                ..config
            },
            attempt: 0,
        }
    }

    /// The capped delay for the current attempt, before jitter.
    pub fn nominal_delay(&self) -> Duration {
        let factor = self.config.multiplier.powi(self.attempt.min(i32::MAX as u32) as i32);
        let secs = self.config.base.as_secs_f64() * factor;
        let max = self.config.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.config.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Calculate the next delay and increment the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let capped_delay = self.nominal_delay();

        let jitter_range = capped_delay.as_secs_f64() * self.config.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_secs = (capped_delay.as_secs_f64() + jitter).max(0.0);

        self.attempt = self.attempt.saturating_add(1);

        Duration::from_secs_f64(final_secs)
    }

    /// Reset the attempt counter (call after a stable connection).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base: u64, max: u64, multiplier: f64) -> ExponentialBackoff {
        ExponentialBackoff::from_config(BackoffConfig {
            base: Duration::from_secs(base),
            multiplier,
            jitter_factor: 0.0,
            max_delay: Duration::from_secs(max),
        })
    }

    #[test]
    fn test_backoff_increases_exponentially() {
        let mut backoff = no_jitter(1, 60, 2.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_custom_multiplier() {
        let mut backoff = no_jitter(1, 60, 3.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(9));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let mut backoff = no_jitter(1, 10, 2.0);

        for _ in 0..10 {
            backoff.next_delay();
        }

        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_huge_attempt_stays_capped() {
        let mut backoff = no_jitter(1, 60, 2.0);
        for _ in 0..2000 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = no_jitter(1, 60, 2.0);

        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_jitter_within_half_of_nominal() {
        let mut backoff = ExponentialBackoff::default();

        // Failure N waits within +/-50% of min(60, 2^(N-1))
        for n in 1..=10u32 {
            let nominal = backoff.nominal_delay().as_secs_f64();
            let expected = (2f64.powi(n as i32 - 1)).min(60.0);
            assert_eq!(nominal, expected);

            let secs = backoff.next_delay().as_secs_f64();
            assert!(
                secs >= expected * 0.5 && secs <= expected * 1.5,
                "attempt {} delay {} outside [{}, {}]",
                n,
                secs,
                expected * 0.5,
                expected * 1.5
            );
        }
    }

    #[test]
    fn test_backoff_negative_jitter_clamped() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), -0.5);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
