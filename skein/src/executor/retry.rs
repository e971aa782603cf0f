//! Exponential backoff policy for transient LLM errors.
//!
//! Applied at the LLM boundary (not at the node boundary): the environment
//! retries `Timeout`, `RateLimited`, and `Transient5xx`; everything else
//! surfaces immediately.

use std::time::Duration;

/// Backoff schedule: `delay = base * multiplier^(attempt - 1)`, capped at
/// `max_delay`, up to `max_attempts` total attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: f64,
    pub base: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: 2.0,
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(
        max_attempts: u32,
        base: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            multiplier,
            base,
            max_delay,
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            multiplier: 1.0,
            base: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retrying after the given 1-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let seconds = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(seconds.max(0.0)).min(self.max_delay)
    }
}
