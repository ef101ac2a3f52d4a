// src/task/retry.rs

//! Retry budget and backoff computation.

use std::time::Duration;

/// Default cap on a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Share of the computed delay used as the upper bound of additive jitter.
const JITTER_FRACTION: f64 = 0.1;

/// How often a task may be attempted and how long to wait in between.
///
/// The delay after a failed attempt `n` (1-based) is
/// `backoff_base * backoff_multiplier^(n-1)`, capped at `max_delay`. With
/// `jitter` enabled a uniformly random extra of up to 10% of that delay is
/// added (the sum is still capped).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    /// A single attempt, no retries.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Exponential policy with the default base (100ms) and multiplier (2.0).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Exactly one attempt.
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Constant delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base: delay,
            backoff_multiplier: 1.0,
            ..Self::default()
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            backoff_base: base,
            backoff_multiplier: multiplier,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Check the policy's invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be >= 1 (got 0)".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be a finite number >= 1.0 (got {})",
                self.backoff_multiplier
            ));
        }
        Ok(())
    }

    /// Whether another attempt is allowed after attempt `attempt` failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Un-jittered delay to wait after attempt `attempt` (1-based) failed.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.backoff_base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff_base.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay to wait after attempt `attempt` (1-based) failed, jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for_attempt(attempt);
        if !self.jitter {
            return delay;
        }

        let extra = delay.as_secs_f64() * JITTER_FRACTION * rand::random::<f64>();
        let jittered = delay + Duration::try_from_secs_f64(extra).unwrap_or_default();
        jittered.min(self.max_delay)
    }
}
