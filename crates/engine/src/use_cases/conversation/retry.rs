//! Exponential backoff for transient dialogue failures.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at the configured maximum, then spread by ±jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay_ms;
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.config.max_delay_ms);

        let jitter_range = (capped as f64 * self.config.jitter_factor) as i64;
        let millis = if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        };
        Duration::from_millis(millis)
    }
}
