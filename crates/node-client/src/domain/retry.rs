//! Increasing retry delay.

use crate::domain::config::RetryConfig;
use std::time::Duration;

/// Produces the delay before each retry: `initial`, `initial * m`,
/// `initial * m^2`, ... capped at `max`. Never decreases.
#[derive(Debug, Clone)]
pub struct IncreasingRetryTimer {
    config: RetryConfig,
    attempts: u32,
    last: Duration,
}

impl IncreasingRetryTimer {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
            last: Duration::ZERO,
        }
    }

    /// Number of delays handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Self::calculate_delay(&self.config, self.attempts).max(self.last);
        self.attempts = self.attempts.saturating_add(1);
        self.last = delay;
        delay
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last = Duration::ZERO;
    }

    fn calculate_delay(config: &RetryConfig, attempts: u32) -> Duration {
        let max = config.max_delay.as_secs_f64();
        let scaled = config.initial_delay.as_secs_f64()
            * config.multiplier.max(1.0).powi(attempts.min(64) as i32);
        if !scaled.is_finite() || scaled >= max {
            config.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

impl Default for IncreasingRetryTimer {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
