use std::time::Duration;

use super::GatewayError;
use crate::config::AppConfig;

/// Longest single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff policy for gateway calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    retryable: fn(&GatewayError) -> bool,
}

impl RetryPolicy {
    /// Doubling backoff that retries transient and rate-limit failures.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: 2.0,
            retryable: GatewayError::is_retryable,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay)
    }

    #[cfg(test)]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[cfg(test)]
    pub fn with_predicate(mut self, retryable: fn(&GatewayError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= MAX_DELAY.as_secs_f64() {
            return MAX_DELAY;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Whether a failure on attempt `attempt` (1-based) should be retried.
    pub fn should_retry(&self, error: &GatewayError, attempt: u32) -> bool {
        attempt < self.max_attempts && (self.retryable)(error)
    }
}
