//! Spacing for repeated download runs.
//!
//! Neither the manifest client nor the sync engine retries on its own. A
//! caller that wants another attempt re-runs the whole sync; `RetryConfig`
//! decides whether another run is allowed and how long to wait before it.
//! Runs are numbered from 1.

use rand::Rng;
use std::time::Duration;

/// How many sync runs to make and how far apart.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total runs, the first one included. Never below 1.
    pub max_attempts: u32,
    /// Wait before the second run; doubles for each run after that.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Spread each wait over 50%..150% of its nominal value.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// One run, no retries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another run may follow run number `completed_run`.
    pub fn allows_run_after(&self, completed_run: u32) -> bool {
        completed_run < self.max_attempts
    }

    /// Wait before starting run number `run` (2 or later).
    pub fn delay_before(&self, run: u32) -> Duration {
        let doublings = run.saturating_sub(2).min(31);
        let nominal = self
            .base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay);

        if !self.jitter {
            return nominal;
        }
        let factor: f64 = rand::rng().random_range(0.5..1.5);
        Duration::try_from_secs_f64(nominal.as_secs_f64() * factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
