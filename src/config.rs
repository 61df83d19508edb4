//! Aggregate configuration for the resilience core.
//!
//! Each component defines its own config next to its implementation; this
//! module composes them into one deserializable document with validated
//! defaults.

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::pipeline::retry::RetryConfig;
use crate::registry::RegistryConfig;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig};
use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub registry: RegistryConfig,
    pub retry: RetryConfig,
    /// Circuit breaker is opt-in; `None` disables it.
    pub breaker: Option<CircuitBreakerConfig>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String, field: &str| {
            Error::validation_for_parameter(
                message,
                field,
                ErrorContext::new().with_source("config"),
            )
        };
        if let Err(msg) = self.rate_limit.validate() {
            return Err(invalid(msg, "rate_limit"));
        }
        if let Err(msg) = self.registry.validate() {
            return Err(invalid(msg, "registry"));
        }
        Ok(())
    }
}
