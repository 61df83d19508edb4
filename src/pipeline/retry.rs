//! Retry policy: bounded exponential backoff over a fixed set of transient
//! failure classes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// HTTP statuses worth retrying: gateway/edge statuses known to be
/// transient infrastructure hiccups rather than application errors.
pub const RETRYABLE_STATUSES: &[u16] = &[502, 503, 504, 520, 522, 524];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry budget per request; 0 disables retries.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub initial_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Exponential backoff: `initial * 2^attempt`, capped at `max_delay`.
    /// An upstream `retry-after` hint takes precedence (still capped).
    fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = self
            .config
            .initial_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        retry_after.unwrap_or(base).min(self.config.max_delay)
    }

    /// Decide whether to retry after a failed attempt. `attempt` is 0-based:
    /// the first failure is attempt 0.
    pub fn should_retry(&self, error: &Error, attempt: u32) -> Option<Duration> {
        if attempt >= self.config.max_retries {
            return None;
        }
        if !error.is_retryable() {
            return None;
        }
        Some(self.backoff_delay(attempt, error.retry_after()))
    }
}
