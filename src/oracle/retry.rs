//! Bounded exponential backoff

use std::time::Duration;

use rand::Rng;

/// Attempt budget and backoff curve for one contributor sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// Upper bound of the uniform random jitter added to every delay
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2,
            jitter: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based) without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay after failed attempt `attempt`, jittered and capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        (self.base_delay(attempt) + jitter).min(self.max_delay)
    }

    /// Sum of the largest possible delays over a fully failing run
    pub fn worst_case_total(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| (self.base_delay(attempt) + self.jitter).min(self.max_delay))
            .sum()
    }
}
