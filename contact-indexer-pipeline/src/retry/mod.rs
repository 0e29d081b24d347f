//! Retry policy for bulk indexing.
//!
//! The delay before retry `n` is `base × 2^(n-1)` plus a random jitter of up
//! to `jitter × delay`, so concurrent workers retrying the same overloaded
//! cluster spread out instead of retrying in lockstep.

use std::time::Duration;

use rand::Rng;

use crate::config::{PipelineConfig, MAX_ATTEMPTS_CEILING};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then make another attempt.
    RetryAfter(Duration),
    /// The attempt budget is spent; dead-letter the remaining documents.
    Exhausted,
}

/// Bounded exponential backoff with additive jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, jitter: f64) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_CEILING),
            base_delay,
            jitter: if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 },
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_attempts, config.retry_base_delay, config.retry_jitter)
    }

    /// Total attempts allowed per batch, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Largest jitter that may be added after attempt `attempt`.
    pub fn max_jitter(&self, attempt: u32) -> Duration {
        self.backoff(attempt).mul_f64(self.jitter)
    }

    /// Jittered delay after attempt `attempt`, drawing from `rng`.
    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let backoff = self.backoff(attempt);
        if self.jitter == 0.0 {
            return backoff;
        }
        let factor = rng.gen_range(0.0..=self.jitter);
        backoff.saturating_add(backoff.mul_f64(factor))
    }

    /// Decide what follows failed attempt `attempt` (1-based).
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.delay_with(attempt, &mut rand::thread_rng()))
    }

    /// Sum of un-jittered delays across a fully exhausted budget.
    pub fn minimum_total_delay(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.backoff(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
