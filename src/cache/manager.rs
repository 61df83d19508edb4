//! Cache manager: configuration, statistics, and the memoization entry point.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::{CacheBackend, DiskCache, HybridCache, MemoryCache, NullCache};
use super::key::memo_cache_key;
use crate::Result;

/// Which tier(s) back the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Disk,
    Hybrid,
}

/// Content class of a cached value. Selects the disk subdirectory and the
/// configuration filter that may exclude the class from caching entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClass {
    Text,
    Image,
    Metadata,
}

impl ContentClass {
    pub(crate) const ALL: [ContentClass; 3] =
        [ContentClass::Text, ContentClass::Image, ContentClass::Metadata];

    /// Disk-tier subdirectory for this class.
    pub fn dir(&self) -> &'static str {
        match self {
            ContentClass::Text => "text",
            ContentClass::Image => "images",
            ContentClass::Metadata => "metadata",
        }
    }

    pub(crate) fn from_prefix(prefix: &str) -> ContentClass {
        match prefix {
            "text" => ContentClass::Text,
            "images" => ContentClass::Image,
            _ => ContentClass::Metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackendKind,
    /// Maximum entry age; expiry is checked lazily on read.
    pub ttl: Duration,
    /// Entry-count bound for the memory tier.
    pub max_memory_size: usize,
    /// Entry-count bound for the disk tier.
    pub max_disk_size: usize,
    pub cache_text: bool,
    pub cache_images: bool,
    /// Root directory for the disk tier; created on first use.
    pub disk_root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Memory,
            ttl: Duration::from_secs(3600),
            max_memory_size: 1000,
            max_disk_size: 10_000,
            cache_text: true,
            cache_images: true,
            disk_root: std::env::temp_dir().join("ai-resilience-cache"),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_backend(mut self, backend: CacheBackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_memory_size(mut self, entries: usize) -> Self {
        self.max_memory_size = entries;
        self
    }

    pub fn with_max_disk_size(mut self, entries: usize) -> Self {
        self.max_disk_size = entries;
        self
    }

    pub fn with_cache_text(mut self, enabled: bool) -> Self {
        self.cache_text = enabled;
        self
    }

    pub fn with_cache_images(mut self, enabled: bool) -> Self {
        self.cache_images = enabled;
        self
    }

    pub fn with_disk_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.disk_root = root.into();
        self
    }

    fn caches_class(&self, class: ContentClass) -> bool {
        match class {
            ContentClass::Text => self.cache_text,
            ContentClass::Image => self.cache_images,
            ContentClass::Metadata => true,
        }
    }
}

/// Point-in-time counters. `hits`, `misses`, and `evictions` only grow;
/// `clear()` (full, unprefixed) is the one reset.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub errors: u64,
}

impl CacheStats {
    /// Hit rate in percent; 0.0 before any operation.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// High-level cache with TTL, statistics, and content-class filtering.
///
/// Caching is a performance optimization, never a correctness dependency:
/// backend failures are logged, counted, and downgraded to a miss/no-op
/// instead of reaching the caller.
pub struct CacheManager {
    config: CacheConfig,
    backend: Box<dyn CacheBackend>,
    stats: AtomicStats,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        let backend: Box<dyn CacheBackend> = if !config.enabled {
            Box::new(NullCache::new())
        } else {
            match config.backend {
                CacheBackendKind::Memory => Box::new(MemoryCache::new(config.max_memory_size)),
                CacheBackendKind::Disk => {
                    Box::new(DiskCache::new(&config.disk_root, config.max_disk_size))
                }
                CacheBackendKind::Hybrid => Box::new(HybridCache::new(
                    &config.disk_root,
                    config.max_memory_size,
                    config.max_disk_size,
                    config.ttl,
                )),
            }
        };
        Self {
            config,
            backend,
            stats: AtomicStats::default(),
        }
    }

    /// Inject a custom backend (tests, instrumentation).
    pub fn with_backend(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Look up a key. Absent, expired, and disabled all count as a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.backend.get(key).await {
            Ok(Some(data)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, backend = self.backend.name(), "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Store a value. Returns whether it was actually written; disabled
    /// caches and excluded content classes are a no-op returning `false`.
    pub async fn set(&self, key: &str, class: ContentClass, value: &[u8]) -> bool {
        if !self.config.enabled || !self.config.caches_class(class) {
            return false;
        }
        match self.backend.set(key, class, value, self.config.ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, backend = self.backend.name(), "cache write failed; skipping");
                false
            }
        }
    }

    /// Drop entries under `prefix`, or everything (statistics included) when
    /// `prefix` is `None`.
    pub async fn clear(&self, prefix: Option<&str>) {
        if let Err(e) = self.backend.clear(prefix).await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "cache clear failed");
            return;
        }
        if prefix.is_none() {
            self.stats.hits.store(0, Ordering::Relaxed);
            self.stats.misses.store(0, Ordering::Relaxed);
            self.stats.errors.store(0, Ordering::Relaxed);
        }
    }

    pub async fn len(&self) -> usize {
        self.backend.len().await.unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.backend.evictions(),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }

    /// Memoize an async computation.
    ///
    /// The key derives from `prefix` and a stable JSON serialization of
    /// `args`; on a hit the stored result is returned without invoking `f`.
    /// A corrupt or unreadable entry falls through to `f` like a miss.
    /// Computation failures are returned to the caller and cached nothing.
    pub async fn get_or_compute<A, T, F, Fut>(&self, prefix: &str, args: &A, f: F) -> Result<T>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let args_json = serde_json::to_string(args)?;
        let key = memo_cache_key(prefix, &args_json);

        if let Some(data) = self.get(&key).await {
            match serde_json::from_slice(&data) {
                Ok(value) => {
                    debug!(prefix, "memoized result served from cache");
                    return Ok(value);
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, prefix, "memoized entry undecodable; recomputing");
                }
            }
        }

        let value = f().await?;
        if let Ok(encoded) = serde_json::to_vec(&value) {
            self.set(&key, ContentClass::Metadata, &encoded).await;
        }
        Ok(value)
    }
}
