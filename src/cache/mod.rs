//! 响应缓存模块：内存与磁盘混合的 TTL/LRU 缓存。
//!
//! # Response Caching Module
//!
//! Time-bounded, size-bounded caching for idempotent AI-API calls. Avoiding
//! a duplicate network round-trip is the whole point; a cache failure is
//! therefore never an error, only a miss.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | TTL, statistics, content-class filters, memoization |
//! | [`CacheConfig`] | Backend selection and bounds |
//! | [`CacheBackend`] | Trait for cache tiers |
//! | [`MemoryCache`] | Bounded in-memory LRU tier |
//! | [`DiskCache`] | Bounded on-disk tier (per-class subdirectories) |
//! | [`HybridCache`] | Memory front + disk backing with promotion |
//! | [`NullCache`] | Pass-through for `enabled = false` |
//!
//! Cache keys hash only redacted request material (see [`key`]), so
//! credentials can never round-trip through the key space, the disk tier,
//! or a log line.

pub mod backend;
pub mod key;
pub mod manager;

pub use backend::{CacheBackend, DiskCache, HybridCache, MemoryCache, NullCache};
pub use key::{memo_cache_key, redact, request_cache_key, sanitize_component, REDACTED};
pub use manager::{CacheBackendKind, CacheConfig, CacheManager, CacheStats, ContentClass};
