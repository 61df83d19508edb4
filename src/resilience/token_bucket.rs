//! 令牌桶：准入控制的基本单元。
//!
//! Token bucket — the unit of admission control.

use std::time::{Duration, Instant};

/// A single token bucket with continuous lazy refill.
///
/// The token count is recomputed on every access as
/// `min(capacity, tokens + elapsed * refill_rate)`; it never goes negative
/// and never exceeds `capacity`. The bucket itself is not synchronized;
/// callers mutate it under their own lock.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket. Non-finite or negative inputs are clamped so the
    /// invariants hold from the start.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        let capacity = if capacity.is_finite() { capacity.max(0.0) } else { 0.0 };
        let refill_rate = if refill_rate.is_finite() {
            refill_rate.max(0.0)
        } else {
            0.0
        };
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Current token count after applying lazy refill.
    pub fn tokens(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Refill, then deduct `cost` tokens if available. Refill, check, and
    /// deduct happen in one call so a caller holding the bucket's lock gets
    /// an atomic acquisition.
    pub fn try_take(&mut self, cost: f64) -> bool {
        if cost <= 0.0 {
            return true;
        }
        self.refill();
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Time until `cost` tokens will be available, assuming no other takers.
    ///
    /// Returns `None` when `cost` exceeds `capacity`: such an acquisition
    /// can never succeed and callers must fail fast instead of waiting.
    pub fn time_until(&mut self, cost: f64) -> Option<Duration> {
        if cost > self.capacity {
            return None;
        }
        self.refill();
        if self.tokens >= cost {
            return Some(Duration::ZERO);
        }
        if self.refill_rate <= 0.0 {
            // Never refills; an empty bucket stays empty.
            return None;
        }
        let missing = cost - self.tokens;
        Some(Duration::from_secs_f64(missing / self.refill_rate))
    }
}
