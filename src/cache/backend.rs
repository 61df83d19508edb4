//! Cache backend implementations.
//!
//! Backends store opaque bytes under string keys with a per-entry TTL.
//! Eviction policy is LRU via [`lru::LruCache`], so the eviction contract is
//! explicit rather than borrowed from a map's iteration order. Hit/miss
//! accounting lives in the manager; backends only count their own evictions.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::key::sanitize_component;
use super::manager::ContentClass;
use crate::Result;

/// One cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    data: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
    hits: u64,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            created_at: Instant::now(),
            ttl,
            hits: 0,
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }

    fn touch(&mut self) -> &[u8] {
        self.hits += 1;
        &self.data
    }

    pub(crate) fn size(&self) -> usize {
        self.data.len()
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, class: ContentClass, value: &[u8], ttl: Duration) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<bool>;
    /// Remove entries whose key starts with `prefix`, or everything when
    /// `prefix` is `None`.
    async fn clear(&self, prefix: Option<&str>) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
    /// Capacity evictions performed so far (expiry removals not included).
    fn evictions(&self) -> u64;
}

/// Bounded in-memory tier.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    evictions: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.lock();
        // Peek first so an expired entry never refreshes its recency.
        let expired = entries.peek(key).map(CacheEntry::is_expired);
        match expired {
            None => Ok(None),
            Some(true) => {
                entries.pop(key);
                Ok(None)
            }
            Some(false) => {
                let data = entries
                    .get_mut(key)
                    .map(|entry| entry.touch().to_vec());
                Ok(data)
            }
        }
    }

    async fn set(&self, key: &str, _class: ContentClass, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.lock();
        if let Some((evicted_key, evicted)) =
            entries.push(key.to_string(), CacheEntry::new(value.to_vec(), ttl))
        {
            // push returns the displaced LRU entry when at capacity, or the
            // old value for the same key (an overwrite, not an eviction).
            if evicted_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    key = %evicted_key,
                    size = evicted.size(),
                    hits = evicted.hits,
                    "memory cache evicted LRU entry"
                );
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock().pop(key).is_some())
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<()> {
        let mut entries = self.lock();
        match prefix {
            None => entries.clear(),
            Some(prefix) => {
                let matching: Vec<String> = entries
                    .iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, _)| k.clone())
                    .collect();
                for k in matching {
                    entries.pop(&k);
                }
            }
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let entries = self.lock();
        Ok(entries.iter().filter(|(_, e)| !e.is_expired()).count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// On-disk envelope. Age comes from the file's mtime; the TTL travels with
/// the entry because the reader does not know the writer's configuration.
#[derive(Serialize, Deserialize)]
struct DiskEnvelope {
    ttl_secs: f64,
    data: String,
}

/// Bounded on-disk tier.
///
/// Layout: one subdirectory per content class (`text/`, `images/`,
/// `metadata/`) under the root, filenames derived from the sanitized cache
/// key. Directories are created on first write. The entry-count bound is
/// enforced through an in-memory LRU index, seeded from the directory tree
/// so restarts do not orphan files.
pub struct DiskCache {
    root: PathBuf,
    index: Mutex<LruCache<String, PathBuf>>,
    evictions: AtomicU64,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>, max_entries: usize) -> Self {
        let root = root.into();
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        let mut index = LruCache::new(cap);
        Self::seed_index(&root, &mut index);
        Self {
            root,
            index: Mutex::new(index),
            evictions: AtomicU64::new(0),
        }
    }

    /// Pick up files left by a previous process, oldest first so they sit at
    /// the LRU end of the index.
    fn seed_index(root: &Path, index: &mut LruCache<String, PathBuf>) {
        let mut found: Vec<(std::time::SystemTime, String, PathBuf)> = Vec::new();
        for class in ContentClass::ALL {
            let dir = root.join(class.dir());
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                found.push((modified, format!("{}/{}", class.dir(), name), path));
            }
        }
        found.sort_by_key(|(modified, _, _)| *modified);
        for (_, key, path) in found {
            index.push(key, path);
        }
    }

    fn path_for(&self, key: &str, class: ContentClass) -> PathBuf {
        self.root.join(class.dir()).join(sanitize_component(key))
    }

    /// Index keys carry the class directory so lookups survive arbitrary key
    /// prefixes; the cache key itself maps to the same index slot either way.
    fn index_key(key: &str, class: ContentClass) -> String {
        format!("{}/{}", class.dir(), sanitize_component(key))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, PathBuf>> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn find_path(&self, key: &str) -> Option<PathBuf> {
        let mut index = self.lock();
        for class in ContentClass::ALL {
            let ik = Self::index_key(key, class);
            if let Some(path) = index.get(&ik) {
                return Some(path.clone());
            }
        }
        None
    }

    fn read_entry(path: &Path) -> Result<Option<Vec<u8>>> {
        let meta = std::fs::metadata(path)?;
        let raw = std::fs::read(path)?;
        let envelope: DiskEnvelope = serde_json::from_slice(&raw)?;
        let age = meta
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .unwrap_or(Duration::ZERO);
        if age > Duration::from_secs_f64(envelope.ttl_secs) {
            let _ = std::fs::remove_file(path);
            return Ok(None);
        }
        let data = base64::engine::general_purpose::STANDARD
            .decode(envelope.data.as_bytes())
            .map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
            })?;
        Ok(Some(data))
    }
}

#[async_trait]
impl CacheBackend for DiskCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.find_path(key) else {
            return Ok(None);
        };
        match Self::read_entry(&path) {
            Ok(Some(data)) => Ok(Some(data)),
            Ok(None) => {
                // Expired on disk; drop the index slot too.
                let mut index = self.lock();
                for class in ContentClass::ALL {
                    index.pop(&Self::index_key(key, class));
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn set(&self, key: &str, class: ContentClass, value: &[u8], ttl: Duration) -> Result<()> {
        let dir = self.root.join(class.dir());
        std::fs::create_dir_all(&dir)?;
        let path = self.path_for(key, class);
        let envelope = DiskEnvelope {
            ttl_secs: ttl.as_secs_f64(),
            data: base64::engine::general_purpose::STANDARD.encode(value),
        };
        std::fs::write(&path, serde_json::to_vec(&envelope)?)?;

        let ik = Self::index_key(key, class);
        let mut index = self.lock();
        if let Some((evicted_key, evicted_path)) = index.push(ik.clone(), path) {
            if evicted_key != ik {
                let _ = std::fs::remove_file(&evicted_path);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %evicted_key, "disk cache evicted LRU entry");
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut index = self.lock();
        let mut removed = false;
        for class in ContentClass::ALL {
            if let Some(path) = index.pop(&Self::index_key(key, class)) {
                let _ = std::fs::remove_file(&path);
                removed = true;
            }
        }
        Ok(removed)
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<()> {
        let mut index = self.lock();
        let sanitized_prefix = prefix.map(sanitize_component);
        let matching: Vec<String> = index
            .iter()
            .filter(|(k, _)| match &sanitized_prefix {
                None => true,
                // Index keys are "{class_dir}/{sanitized_key}".
                Some(p) => k
                    .split_once('/')
                    .map(|(_, name)| name.starts_with(p.as_str()))
                    .unwrap_or(false),
            })
            .map(|(k, _)| k.clone())
            .collect();
        for k in matching {
            if let Some(path) = index.pop(&k) {
                let _ = std::fs::remove_file(&path);
            }
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock().len())
    }

    fn name(&self) -> &'static str {
        "disk"
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Memory front, disk backing store.
///
/// Writes go to both tiers; reads hit memory first and promote a disk hit
/// back into memory so hot entries survive memory-tier eviction.
pub struct HybridCache {
    memory: MemoryCache,
    disk: DiskCache,
    promote_ttl: Duration,
}

impl HybridCache {
    pub fn new(
        root: impl Into<PathBuf>,
        max_memory_entries: usize,
        max_disk_entries: usize,
        promote_ttl: Duration,
    ) -> Self {
        Self {
            memory: MemoryCache::new(max_memory_entries),
            disk: DiskCache::new(root, max_disk_entries),
            promote_ttl,
        }
    }

    fn class_of(key: &str) -> ContentClass {
        key.split_once(':')
            .map(|(prefix, _)| ContentClass::from_prefix(prefix))
            .unwrap_or(ContentClass::Metadata)
    }
}

#[async_trait]
impl CacheBackend for HybridCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.memory.get(key).await? {
            return Ok(Some(data));
        }
        match self.disk.get(key).await? {
            Some(data) => {
                self.memory
                    .set(key, Self::class_of(key), &data, self.promote_ttl)
                    .await?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, class: ContentClass, value: &[u8], ttl: Duration) -> Result<()> {
        self.memory.set(key, class, value, ttl).await?;
        self.disk.set(key, class, value, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let in_memory = self.memory.remove(key).await?;
        let on_disk = self.disk.remove(key).await?;
        Ok(in_memory || on_disk)
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<()> {
        self.memory.clear(prefix).await?;
        self.disk.clear(prefix).await
    }

    async fn len(&self) -> Result<usize> {
        let memory = self.memory.len().await?;
        let disk = self.disk.len().await?;
        Ok(memory.max(disk))
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn evictions(&self) -> u64 {
        self.memory.evictions() + self.disk.evictions()
    }
}

/// No-op backend for `enabled = false`: never stores, never hits.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &str, _: ContentClass, _: &[u8], _: Duration) -> Result<()> {
        Ok(())
    }
    async fn remove(&self, _: &str) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self, _: Option<&str>) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
    fn evictions(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let cache = MemoryCache::new(10);
        cache
            .set("text:a", ContentClass::Text, b"hello", TTL)
            .await
            .unwrap();
        assert_eq!(cache.get("text:a").await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(cache.get("text:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_ttl_expiry() {
        let cache = MemoryCache::new(10);
        cache
            .set("text:a", ContentClass::Text, b"v", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(cache.get("text:a").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.get("text:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_lru_eviction() {
        let cache = MemoryCache::new(10);
        for i in 0..10 {
            cache
                .set(&format!("text:{}", i), ContentClass::Text, b"v", TTL)
                .await
                .unwrap();
        }
        // Touch 0 so 1 becomes least-recently-used.
        assert!(cache.get("text:0").await.unwrap().is_some());
        cache
            .set("text:new", ContentClass::Text, b"v", TTL)
            .await
            .unwrap();
        assert!(cache.evictions() >= 1);
        assert_eq!(cache.get("text:1").await.unwrap(), None);
        assert!(cache.get("text:0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_overwrite_is_not_eviction() {
        let cache = MemoryCache::new(10);
        cache
            .set("text:a", ContentClass::Text, b"v1", TTL)
            .await
            .unwrap();
        cache
            .set("text:a", ContentClass::Text, b"v2", TTL)
            .await
            .unwrap();
        assert_eq!(cache.evictions(), 0);
        assert_eq!(cache.get("text:a").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_clear_prefix() {
        let cache = MemoryCache::new(10);
        cache
            .set("text:a", ContentClass::Text, b"v", TTL)
            .await
            .unwrap();
        cache
            .set("images:b", ContentClass::Image, b"v", TTL)
            .await
            .unwrap();
        cache.clear(Some("text:")).await.unwrap();
        assert_eq!(cache.get("text:a").await.unwrap(), None);
        assert!(cache.get("images:b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_disk_roundtrip_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 10);
        cache
            .set("text:abc123", ContentClass::Text, b"payload", TTL)
            .await
            .unwrap();
        assert_eq!(
            cache.get("text:abc123").await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert!(dir.path().join("text").is_dir());
    }

    #[tokio::test]
    async fn test_disk_ttl_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 10);
        cache
            .set(
                "metadata:x",
                ContentClass::Metadata,
                b"v",
                Duration::from_millis(100),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.get("metadata:x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disk_eviction_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 2);
        cache
            .set("text:a", ContentClass::Text, b"1", TTL)
            .await
            .unwrap();
        cache
            .set("text:b", ContentClass::Text, b"2", TTL)
            .await
            .unwrap();
        cache
            .set("text:c", ContentClass::Text, b"3", TTL)
            .await
            .unwrap();
        assert_eq!(cache.evictions(), 1);
        assert_eq!(cache.get("text:a").await.unwrap(), None);
        assert!(cache.get("text:c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_disk_index_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = DiskCache::new(dir.path(), 10);
            cache
                .set("text:persisted", ContentClass::Text, b"v", TTL)
                .await
                .unwrap();
        }
        let reopened = DiskCache::new(dir.path(), 10);
        assert_eq!(
            reopened.get("text:persisted").await.unwrap(),
            Some(b"v".to_vec())
        );
    }

    #[tokio::test]
    async fn test_hybrid_promotes_disk_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HybridCache::new(dir.path(), 2, 10, TTL);
        // Push three entries so "text:a" falls out of the memory tier.
        for k in ["text:a", "text:b", "text:c"] {
            cache.set(k, ContentClass::Text, b"v", TTL).await.unwrap();
        }
        assert_eq!(cache.memory.get("text:a").await.unwrap(), None);
        // Still served from disk, and promoted back into memory.
        assert!(cache.get("text:a").await.unwrap().is_some());
        assert!(cache.memory.get("text:a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_null_cache_never_stores() {
        let cache = NullCache::new();
        cache
            .set("text:a", ContentClass::Text, b"v", TTL)
            .await
            .unwrap();
        assert_eq!(cache.get("text:a").await.unwrap(), None);
        assert_eq!(cache.len().await.unwrap(), 0);
    }
}
