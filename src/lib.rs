//! # ai-resilience
//!
//! AI API 客户端的弹性核心：限流、缓存、模型注册表与带重试的请求管道。
//!
//! The resilience core of an AI-API client SDK — the layer between
//! application calls ("generate text", "generate image") and outbound HTTP
//! requests that makes those calls safe to issue repeatedly under
//! concurrency, rate limits, and transient failure.
//!
//! ## What it does
//!
//! - **Admission control**: a keyed token-bucket [`resilience::RateLimiter`]
//!   bounds the outbound request rate per endpoint class, with blocking and
//!   non-blocking acquisition.
//! - **Response caching**: a hybrid memory+disk TTL/LRU [`cache`] avoids
//!   redundant network calls for idempotent requests and memoizes arbitrary
//!   async computations. Cache keys and logs never contain credentials.
//! - **Model discovery**: a lazily initialized, periodically refreshed
//!   [`registry::ModelRegistry`] keeps the set of valid model identifiers
//!   usable even with zero network access.
//! - **Failure handling**: the [`pipeline::RequestPipeline`] composes all of
//!   the above around each call, retries transient failures with bounded
//!   exponential backoff, and classifies every outcome into one typed
//!   [`Error`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ai_resilience::{ApiRequest, Config, RequestPipeline};
//!
//! #[tokio::main]
//! async fn main() -> ai_resilience::Result<()> {
//!     let pipeline = RequestPipeline::new(Config::default())?;
//!
//!     let model = pipeline.resolve_model("gpt-4o").await?;
//!     let response = pipeline
//!         .execute(
//!             ApiRequest::post(
//!                 "https://api.example.com/v1/chat",
//!                 format!("{{\"model\":\"{}\"}}", model).into_bytes(),
//!             )
//!             .with_endpoint_class("chat"),
//!         )
//!         .await?;
//!
//!     println!("status: {}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`resilience`] | Token bucket, rate limiter, circuit breaker |
//! | [`cache`] | Hybrid TTL/LRU cache with redacted keys and memoization |
//! | [`registry`] | Lazily initialized model identifier registry |
//! | [`transport`] | HTTP transport seam with tagged failure variants |
//! | [`pipeline`] | Request orchestration, retry policy, error classification |
//! | [`config`] | Aggregate configuration |
//!
//! The crate is a library boundary only: payload schemas, authentication,
//! and presentation layers live above it; the wire itself lives below the
//! [`transport::Transport`] seam.

pub mod cache;
pub mod config;
pub mod pipeline;
pub mod registry;
pub mod resilience;
pub mod transport;

/// Error type for the library
pub mod error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

pub use cache::{CacheConfig, CacheManager, CacheStats, ContentClass};
pub use config::Config;
pub use error::{Error, ErrorContext};
pub use pipeline::retry::RetryConfig;
pub use pipeline::{ApiRequest, PipelineSignals, RequestPipeline, RequestPipelineBuilder};
pub use registry::{ModelInfo, ModelRegistry, RegistryConfig};
pub use resilience::{CircuitBreakerConfig, RateLimitConfig, RateLimiter};
pub use transport::{Method, Transport, TransportError, WireRequest, WireResponse};
