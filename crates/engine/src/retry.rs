//! Retry schedule for generation attempts.

use std::time::Duration;

use rand::Rng;

/// How many times a work item is attempted and how long to wait in between.
///
/// The wait after failed attempt `n` (1-based) is `n × backoff_unit`, so the
/// default schedule is 2s then 4s across 3 attempts. With `jitter` enabled a
/// uniformly random extra delay in `[0, backoff_unit)` is added to each wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_unit: Duration,
    jitter: bool,
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
            jitter: false,
        }
    }

    /// A policy that retries immediately. Intended for tests.
    pub fn no_delay(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Enables or disables backoff jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts per work item, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` if another attempt is allowed after `attempt` failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.backoff_unit.saturating_mul(attempt);
        if self.jitter && !self.backoff_unit.is_zero() {
            let extra = rand::thread_rng().gen_range(Duration::ZERO..self.backoff_unit);
            base.saturating_add(extra)
        } else {
            base
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}
