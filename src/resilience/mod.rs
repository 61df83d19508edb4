//! 弹性模块：限流与熔断等准入控制原语。
//!
//! # Resilience Primitives
//!
//! Admission control for outbound AI-API requests. Nothing here touches the
//! network; these primitives decide whether a request may proceed before it
//! consumes downstream resources.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`token_bucket`] | Single token bucket with continuous lazy refill |
//! | [`rate_limiter`] | Keyed token-bucket rate limiter with blocking and non-blocking acquire |
//! | [`circuit_breaker`] | Per-endpoint-class consecutive-failure circuit breaker |
//!
//! ```rust
//! use ai_resilience::resilience::rate_limiter::{RateLimiter, RateLimitConfig, DEFAULT_CLASS};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let limiter = RateLimiter::new(
//!     RateLimitConfig::new()
//!         .with_requests_per_minute(120.0)
//!         .with_burst_capacity(10.0),
//! );
//!
//! if limiter.acquire(DEFAULT_CLASS, 1.0).await {
//!     // Proceed with the request...
//! }
//! # }
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod token_bucket;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
pub use rate_limiter::{BucketSnapshot, RateLimitConfig, RateLimiter, DEFAULT_CLASS};
pub use token_bucket::TokenBucket;
