//! 限流器：按键分桶的令牌桶准入控制。
//!
//! Keyed token-bucket rate limiter.
//!
//! Each endpoint class gets its own [`TokenBucket`]; unknown keys lazily
//! create a bucket from the configured defaults. Acquisition (refill + check
//! + deduct) is one critical section per key, so two concurrent callers can
//! never both observe sufficient tokens. Waiters sleep outside the lock and
//! re-acquire, which means token grants follow availability, not strict FIFO
//! order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::token_bucket::TokenBucket;

/// Bucket key used when the caller does not name an endpoint class.
pub const DEFAULT_CLASS: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained request budget, tokens refill at `requests_per_minute / 60`
    /// per second.
    pub requests_per_minute: f64,
    /// Bucket capacity; bounds how many requests may burst at once.
    pub burst_capacity: f64,
    /// Default deadline for [`RateLimiter::acquire_with_wait`] callers that
    /// go through the pipeline.
    pub admission_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60.0,
            burst_capacity: 10.0,
            admission_timeout: Duration::from_secs(30),
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requests_per_minute(mut self, rpm: f64) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_burst_capacity(mut self, burst: f64) -> Self {
        self.burst_capacity = burst;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.requests_per_minute.is_finite() || self.requests_per_minute <= 0.0 {
            return Err("rate_limit.requests_per_minute must be a positive number".into());
        }
        if !self.burst_capacity.is_finite() || self.burst_capacity <= 0.0 {
            return Err("rate_limit.burst_capacity must be a positive number".into());
        }
        Ok(())
    }

    fn refill_rate(&self) -> f64 {
        self.requests_per_minute / 60.0
    }
}

/// Read-only view of one bucket, for observability.
#[derive(Debug, Clone)]
pub struct BucketSnapshot {
    pub key: String,
    pub capacity: f64,
    pub refill_rate: f64,
    pub tokens: f64,
    /// Estimated wait until one token is available, if currently empty.
    pub estimated_wait: Option<Duration>,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-seed a bucket with capacity/rate different from the defaults
    /// (e.g., a stricter budget for an expensive endpoint class).
    pub fn with_bucket(mut self, key: impl Into<String>, capacity: f64, refill_rate: f64) -> Self {
        self.buckets
            .get_mut()
            .insert(key.into(), TokenBucket::new(capacity, refill_rate));
        self
    }

    fn default_bucket(&self) -> TokenBucket {
        TokenBucket::new(self.config.burst_capacity, self.config.refill_rate())
    }

    pub fn admission_timeout(&self) -> Duration {
        self.config.admission_timeout
    }

    /// Non-blocking acquisition: deduct `cost` tokens if available.
    pub async fn acquire(&self, key: &str, cost: f64) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| self.default_bucket());
        bucket.try_take(cost)
    }

    /// Blocking acquisition: wait until `cost` tokens are available or
    /// `timeout` elapses. A zero `timeout` behaves like [`Self::acquire`].
    ///
    /// Acquisitions with `cost > capacity` fail fast without waiting.
    pub async fn acquire_with_wait(&self, key: &str, cost: f64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let bucket = buckets
                    .entry(key.to_string())
                    .or_insert_with(|| self.default_bucket());
                if bucket.try_take(cost) {
                    return true;
                }
                match bucket.time_until(cost) {
                    // Can never succeed (cost above capacity, or no refill).
                    None => return false,
                    Some(d) => d,
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // Sleep outside the lock; another waiter may take the token
            // first, in which case the next iteration waits again.
            let sleep_for = wait.min(deadline - now);
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Estimated wait until `cost` tokens are available for `key`, assuming
    /// no competing takers. `None` when the acquisition can never succeed.
    pub async fn time_until_available(&self, key: &str, cost: f64) -> Option<Duration> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| self.default_bucket());
        bucket.time_until(cost)
    }

    pub async fn snapshot(&self, key: &str) -> BucketSnapshot {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| self.default_bucket());
        let tokens = bucket.tokens();
        let estimated_wait = if tokens >= 1.0 {
            None
        } else {
            bucket.time_until(1.0)
        };
        BucketSnapshot {
            key: key.to_string(),
            capacity: bucket.capacity(),
            refill_rate: bucket.refill_rate(),
            tokens,
            estimated_wait,
        }
    }
}
