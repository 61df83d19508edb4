//! 模型注册表 — 惰性初始化、定期刷新的已知模型集合。
//!
//! # Model Registry
//!
//! A lazily initialized, periodically refreshed set of known model
//! identifiers plus catalog metadata. The registry is usable with zero
//! network access (a hardcoded default list seeds it on first touch) and
//! upgrades itself from the configured catalog endpoints when asked to be
//! fresh. Every live-fetch failure is swallowed and logged: a degraded
//! registry is still an available registry.
//!
//! Registration is permissive by design: [`ModelRegistry::resolve`] accepts
//! any non-empty identifier and registers it as known instead of rejecting
//! unrecognized names, so newly shipped models work before a catalog refresh
//! lands. The known-set is LRU-bounded to keep buggy or adversarial callers
//! from growing it without limit.
//!
//! Each registry owns its state; there is no process-wide singleton, so
//! tests and multi-tenant clients never bleed into one another.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::redact;
use crate::{Error, ErrorContext, Result};

/// Models every registry knows before any network activity.
const DEFAULT_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "claude-sonnet-4-5",
    "claude-haiku-4-5",
    "gemini-2.0-flash",
    "llama-3.3-70b",
    "mistral-large",
];

/// Catalog metadata for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Canonical identifier.
    pub name: String,
    /// Alternate identifiers resolving to the same model.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Optional classification (e.g. "fast", "flagship").
    #[serde(default)]
    pub tier: Option<String>,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            tier: None,
        }
    }

    /// Identifier lookup is by membership in `{name} ∪ aliases`.
    pub fn matches(&self, identifier: &str) -> bool {
        self.name == identifier || self.aliases.iter().any(|a| a == identifier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Bound on the known-identifier set; least-recently-touched names are
    /// evicted on overflow.
    pub max_size: usize,
    /// Catalog freshness window.
    pub ttl: Duration,
    /// Catalog endpoints returning model lists; all are merged.
    pub endpoints: Vec<String>,
    /// Per-endpoint fetch timeout.
    pub request_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl: Duration::from_secs(4 * 3600),
            endpoints: Vec::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoints.push(url.into());
        self
    }

    pub fn with_endpoints(mut self, urls: Vec<String>) -> Self {
        self.endpoints = urls;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_size == 0 {
            return Err("registry.max_size must be positive".into());
        }
        Ok(())
    }
}

struct RegistryState {
    known: LruCache<String, ()>,
    info: Vec<ModelInfo>,
    seeded: bool,
    initialized: bool,
    fetched_at: Option<Instant>,
}

impl RegistryState {
    fn new(max_size: usize) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            known: LruCache::new(cap),
            info: Vec::new(),
            seeded: false,
            initialized: false,
            fetched_at: None,
        }
    }

    fn seed_defaults(&mut self) {
        if self.seeded {
            return;
        }
        for name in DEFAULT_MODELS {
            self.known.push((*name).to_string(), ());
        }
        self.seeded = true;
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.initialized
            && self
                .fetched_at
                .map(|at| at.elapsed() <= ttl)
                .unwrap_or(false)
    }
}

/// Lazily initialized model registry with double-checked refresh.
///
/// Shared state lives under one short, non-suspending mutex; the refresh
/// guard serializes catalog fetches so concurrent first access performs
/// exactly one fetch per endpoint. Synchronous callers outside a runtime
/// use [`ModelRegistry::ensure_fresh_blocking`]; asynchronous callers use
/// [`ModelRegistry::ensure_fresh`].
pub struct ModelRegistry {
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    refresh: tokio::sync::Mutex<()>,
    http: reqwest::Client,
}

impl ModelRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                Error::network(
                    format!("failed to build catalog HTTP client: {}", e),
                    ErrorContext::new().with_source("model_registry"),
                )
            })?;
        let state = RegistryState::new(config.max_size);
        Ok(Self {
            config,
            state: Mutex::new(state),
            refresh: tokio::sync::Mutex::new(()),
            http,
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate and register an identifier.
    ///
    /// Any non-empty name is accepted and becomes "known" — forward
    /// registration, not an allow-list. Returns the trimmed name unchanged.
    pub fn resolve(&self, name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::validation_for_parameter(
                "model identifier must not be empty",
                "model",
                ErrorContext::new()
                    .with_source("model_registry")
                    .with_suggestion("pass a model name such as \"gpt-4o\""),
            ));
        }
        let mut state = self.lock_state();
        state.seed_defaults();
        state.known.push(trimmed.to_string(), ());
        Ok(trimmed.to_string())
    }

    /// Membership test; touching a name refreshes its LRU recency.
    pub fn is_known(&self, name: &str) -> bool {
        let mut state = self.lock_state();
        state.seed_defaults();
        state.known.get(name).is_some()
    }

    /// All known identifiers, sorted.
    pub fn all_known(&self) -> Vec<String> {
        let mut state = self.lock_state();
        state.seed_defaults();
        let mut names: Vec<String> = state.known.iter().map(|(k, _)| k.clone()).collect();
        names.sort();
        names
    }

    /// Catalog metadata for an identifier, matched against names and aliases.
    pub fn get_info(&self, name: &str) -> Option<ModelInfo> {
        let state = self.lock_state();
        state.info.iter().find(|i| i.matches(name)).cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_state().initialized
    }

    /// Forget everything, returning to the uninitialized state. Intended for
    /// tests and administrative resets.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        *state = RegistryState::new(self.config.max_size);
    }

    /// Asynchronous entry point of the double-checked initialization
    /// protocol. Cheap when fresh; otherwise one caller refreshes while the
    /// rest wait on the cooperative guard and find fresh state on re-check.
    ///
    /// Never fails: endpoint errors leave the registry in its prior
    /// (possibly default-only) state, marked initialized so callers are not
    /// blocked forever.
    pub async fn ensure_fresh(&self) {
        if self.lock_state().is_fresh(self.config.ttl) {
            return;
        }

        let _guard = self.refresh.lock().await;
        if self.lock_state().is_fresh(self.config.ttl) {
            // Another caller refreshed while we waited for the guard.
            return;
        }
        self.lock_state().seed_defaults();

        let mut fetched: Vec<ModelInfo> = Vec::new();
        for endpoint in &self.config.endpoints {
            match self.fetch_catalog(endpoint).await {
                Ok(mut list) => {
                    debug!(endpoint = %redact(endpoint), models = list.len(), "model catalog fetched");
                    fetched.append(&mut list);
                }
                Err(e) => {
                    warn!(endpoint = %redact(endpoint), error = %e, "model catalog fetch failed");
                }
            }
        }
        self.finish_refresh(fetched);
    }

    /// Blocking twin of [`Self::ensure_fresh`] for synchronous callers.
    ///
    /// Must not be called from within an async runtime; the guard and the
    /// HTTP client here both block the calling thread.
    pub fn ensure_fresh_blocking(&self) {
        if self.lock_state().is_fresh(self.config.ttl) {
            return;
        }

        let _guard = self.refresh.blocking_lock();
        if self.lock_state().is_fresh(self.config.ttl) {
            return;
        }
        self.lock_state().seed_defaults();

        if self.config.endpoints.is_empty() {
            self.finish_refresh(Vec::new());
            return;
        }

        let client = match reqwest::blocking::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "catalog HTTP client unavailable; keeping default registry");
                self.finish_refresh(Vec::new());
                return;
            }
        };

        let mut fetched: Vec<ModelInfo> = Vec::new();
        for endpoint in &self.config.endpoints {
            let result = client
                .get(endpoint)
                .send()
                .map_err(|e| map_fetch_error(e.to_string(), endpoint))
                .and_then(|resp| {
                    let status = resp.status().as_u16();
                    if !resp.status().is_success() {
                        return Err(catalog_status_error(status, endpoint));
                    }
                    resp.json::<serde_json::Value>()
                        .map_err(|e| map_fetch_error(e.to_string(), endpoint))
                });
            match result {
                Ok(body) => fetched.append(&mut parse_catalog(&body)),
                Err(e) => {
                    warn!(endpoint = %redact(endpoint), error = %e, "model catalog fetch failed");
                }
            }
        }
        self.finish_refresh(fetched);
    }

    async fn fetch_catalog(&self, endpoint: &str) -> Result<Vec<ModelInfo>> {
        let resp = self
            .http
            .get(endpoint)
            .send()
            .await
            .map_err(|e| map_fetch_error(e.to_string(), endpoint))?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(catalog_status_error(status, endpoint));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| map_fetch_error(e.to_string(), endpoint))?;
        Ok(parse_catalog(&body))
    }

    /// Merge fetch results and mark the registry initialized. An empty fetch
    /// leaves prior knowledge intact — degraded but available, not failed.
    fn finish_refresh(&self, fetched: Vec<ModelInfo>) {
        let mut state = self.lock_state();
        if !fetched.is_empty() {
            for model in &fetched {
                state.known.push(model.name.clone(), ());
                for alias in &model.aliases {
                    state.known.push(alias.clone(), ());
                }
            }
            state.info = fetched;
            info!(
                known = state.known.len(),
                catalog = state.info.len(),
                "model registry refreshed"
            );
        } else if !state.initialized {
            info!("model registry initialized from defaults only");
        }
        state.initialized = true;
        state.fetched_at = Some(Instant::now());
    }
}

fn map_fetch_error(message: String, endpoint: &str) -> Error {
    Error::network(
        message,
        ErrorContext::new()
            .with_operation("model_catalog_fetch")
            .with_url(redact(endpoint))
            .with_source("model_registry"),
    )
}

fn catalog_status_error(status: u16, endpoint: &str) -> Error {
    Error::Api {
        status,
        message: "catalog endpoint returned non-success status".into(),
        context: ErrorContext::new()
            .with_operation("model_catalog_fetch")
            .with_url(redact(endpoint))
            .with_status_code(status)
            .with_source("model_registry"),
    }
}

/// Accepts the two prevalent catalog shapes:
/// `{"data": [{"id": ...}]}` and `{"models": [...]}` with either string or
/// object items. Anything else parses to an empty list.
fn parse_catalog(body: &serde_json::Value) -> Vec<ModelInfo> {
    let items = body
        .get("data")
        .or_else(|| body.get("models"))
        .and_then(|v| v.as_array());
    let Some(items) = items else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for item in items {
        if let Some(name) = item.as_str() {
            out.push(ModelInfo::new(name));
            continue;
        }
        let Some(name) = item
            .get("id")
            .or_else(|| item.get("name"))
            .and_then(|v| v.as_str())
        else {
            continue;
        };
        let aliases = item
            .get("aliases")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|a| a.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let description = item
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let tier = item
            .get("tier")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        out.push(ModelInfo {
            name: name.to_string(),
            aliases,
            description,
            tier,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry(config: RegistryConfig) -> ModelRegistry {
        ModelRegistry::new(config).unwrap()
    }

    #[test]
    fn test_resolve_registers_any_nonempty_name() {
        let reg = registry(RegistryConfig::default());
        assert_eq!(reg.resolve("my-custom-model").unwrap(), "my-custom-model");
        assert!(reg.is_known("my-custom-model"));
        // Whitespace is trimmed, not rejected.
        assert_eq!(reg.resolve("  gpt-4o  ").unwrap(), "gpt-4o");
    }

    #[test]
    fn test_resolve_rejects_empty() {
        let reg = registry(RegistryConfig::default());
        assert!(reg.resolve("").is_err());
        assert!(reg.resolve("   ").is_err());
    }

    #[test]
    fn test_defaults_seeded_on_first_access() {
        let reg = registry(RegistryConfig::default());
        assert!(reg.is_known("gpt-4o"));
        assert!(!reg.is_known("made-up-model"));
        assert!(!reg.all_known().is_empty());
    }

    #[test]
    fn test_all_known_sorted() {
        let reg = registry(RegistryConfig::default());
        reg.resolve("zzz-model").unwrap();
        reg.resolve("aaa-model").unwrap();
        let names = reg.all_known();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_known_set_is_lru_bounded() {
        let reg = registry(RegistryConfig::new().with_max_size(5));
        for i in 0..20 {
            reg.resolve(&format!("model-{}", i)).unwrap();
        }
        let known = reg.all_known();
        assert_eq!(known.len(), 5);
        // The most recent registrations survive.
        assert!(reg.is_known("model-19"));
        assert!(!reg.is_known("model-0"));
    }

    #[test]
    fn test_model_info_alias_lookup() {
        let info = ModelInfo {
            name: "claude-sonnet-4-5".into(),
            aliases: vec!["claude-sonnet-latest".into()],
            description: String::new(),
            tier: Some("flagship".into()),
        };
        assert!(info.matches("claude-sonnet-4-5"));
        assert!(info.matches("claude-sonnet-latest"));
        assert!(!info.matches("claude-haiku-4-5"));
    }

    #[test]
    fn test_parse_catalog_data_shape() {
        let body = serde_json::json!({
            "data": [
                {"id": "gpt-4o", "description": "omni", "tier": "flagship"},
                {"id": "gpt-4o-mini", "aliases": ["4o-mini"]},
            ]
        });
        let models = parse_catalog(&body);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "gpt-4o");
        assert_eq!(models[0].tier.as_deref(), Some("flagship"));
        assert_eq!(models[1].aliases, vec!["4o-mini".to_string()]);
    }

    #[test]
    fn test_parse_catalog_models_shape() {
        let body = serde_json::json!({"models": ["a-model", {"name": "b-model"}]});
        let models = parse_catalog(&body);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "a-model");
        assert_eq!(models[1].name, "b-model");
    }

    #[test]
    fn test_parse_catalog_malformed_is_empty() {
        assert!(parse_catalog(&serde_json::json!({"unexpected": true})).is_empty());
        assert!(parse_catalog(&serde_json::json!([1, 2, 3])).is_empty());
    }

    #[tokio::test]
    async fn test_ensure_fresh_merges_catalog() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [{"id": "remote-model", "aliases": ["remote-alias"]}]}"#,
            )
            .create_async()
            .await;

        let reg = registry(
            RegistryConfig::new().with_endpoint(format!("{}/v1/models", server.url())),
        );
        reg.ensure_fresh().await;

        mock.assert_async().await;
        assert!(reg.is_initialized());
        assert!(reg.is_known("remote-model"));
        assert!(reg.is_known("remote-alias"));
        assert!(reg.get_info("remote-alias").is_some());
        // Defaults survive the merge.
        assert!(reg.is_known("gpt-4o"));
    }

    #[tokio::test]
    async fn test_ensure_fresh_degrades_on_endpoint_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/models")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let reg = registry(
            RegistryConfig::new().with_endpoint(format!("{}/v1/models", server.url())),
        );
        reg.ensure_fresh().await;

        // Initialized in a degraded default-only state; never an error.
        assert!(reg.is_initialized());
        assert!(reg.is_known("gpt-4o"));
        assert!(reg.get_info("gpt-4o").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_init_fetches_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": [{"id": "remote-model"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let reg = Arc::new(registry(
            RegistryConfig::new().with_endpoint(format!("{}/v1/models", server.url())),
        ));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move { reg.ensure_fresh().await }));
        }
        for h in handles {
            h.await.unwrap();
        }

        mock.assert_async().await;
        assert!(reg.is_known("remote-model"));
    }

    #[tokio::test]
    async fn test_stale_registry_refreshes_on_access() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": [{"id": "remote-model"}]}"#)
            .expect(2)
            .create_async()
            .await;

        let reg = registry(
            RegistryConfig::new()
                .with_ttl(Duration::from_millis(50))
                .with_endpoint(format!("{}/v1/models", server.url())),
        );
        reg.ensure_fresh().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        reg.ensure_fresh().await;

        mock.assert_async().await;
    }

    #[test]
    fn test_reset_returns_to_uninitialized() {
        let reg = registry(RegistryConfig::default());
        reg.resolve("custom").unwrap();
        reg.reset();
        assert!(!reg.is_initialized());
        // Defaults reappear on next access.
        assert!(reg.is_known("gpt-4o"));
        assert!(!reg.is_known("custom"));
    }

    #[test]
    fn test_blocking_refresh_from_sync_context() {
        let reg = registry(RegistryConfig::default());
        // No endpoints configured: initializes from defaults without I/O.
        reg.ensure_fresh_blocking();
        assert!(reg.is_initialized());
        assert!(reg.is_known("gpt-4o"));
    }
}
