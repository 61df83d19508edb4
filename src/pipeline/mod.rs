//! 请求管道：准入 → 缓存 → 网络调用（带重试）→ 错误分类。
//!
//! # Request Pipeline
//!
//! The orchestrator that composes the resilience components around every
//! outbound call:
//!
//! 1. Rate-limiter admission with a bounded wait; denial never touches the
//!    network.
//! 2. Cache lookup for idempotent calls, keyed by redacted request material.
//! 3. Circuit breaker consult (opt-in).
//! 4. The network call under bounded exponential-backoff retry, restricted
//!    to transient failure classes.
//! 5. Classification into the crate error taxonomy; successful cacheable
//!    responses are written back only once fully read.
//!
//! Every attempt logs a structured, redacted entry carrying a correlation
//! id; credentials never reach a log line or a cache key.

pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{redact, request_cache_key, CacheManager, CacheStats, ContentClass};
use crate::config::Config;
use crate::registry::ModelRegistry;
use crate::resilience::{
    BreakerSnapshot, BucketSnapshot, CircuitBreaker, RateLimiter, DEFAULT_CLASS,
};
use crate::transport::{HttpTransport, Method, Transport, TransportError, WireRequest, WireResponse};
use crate::{Error, ErrorContext, Result};

use self::retry::{is_retryable_status, RetryPolicy};

const BODY_PREVIEW_LEN: usize = 200;

/// One application-level request through the pipeline.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// Idempotent requests may be served from and written to the cache.
    pub cacheable: bool,
    /// Rate-limiter bucket and circuit-breaker key.
    pub endpoint_class: String,
    /// Content class for cache filtering and disk layout.
    pub content_class: ContentClass,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            cacheable: true,
            endpoint_class: DEFAULT_CLASS.to_string(),
            content_class: ContentClass::Metadata,
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: HashMap::new(),
            body: Some(body),
            cacheable: false,
            endpoint_class: DEFAULT_CLASS.to_string(),
            content_class: ContentClass::Text,
        }
    }

    pub fn stream(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Stream,
            ..Self::post(url, body)
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_endpoint_class(mut self, class: impl Into<String>) -> Self {
        self.endpoint_class = class.into();
        self
    }

    pub fn with_content_class(mut self, class: ContentClass) -> Self {
        self.content_class = class;
        self
    }

    /// Opt a non-GET request into caching (e.g. a deterministic POST), or a
    /// GET out of it.
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }
}

/// Serialized form of a cached response. The body is base64 so the envelope
/// stays valid JSON regardless of content.
#[derive(Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: String,
}

fn encode_response(resp: &WireResponse) -> Result<Vec<u8>> {
    use base64::Engine;
    let envelope = CachedResponse {
        status: resp.status,
        headers: resp.headers.clone(),
        body: base64::engine::general_purpose::STANDARD.encode(&resp.body),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

fn decode_response(data: &[u8]) -> Option<WireResponse> {
    use base64::Engine;
    let envelope: CachedResponse = serde_json::from_slice(data).ok()?;
    let body = base64::engine::general_purpose::STANDARD
        .decode(envelope.body.as_bytes())
        .ok()?;
    Some(WireResponse {
        status: envelope.status,
        headers: envelope.headers,
        body: body.into(),
    })
}

/// Point-in-time view of the pipeline's shared components for one endpoint
/// class.
#[derive(Debug, Clone)]
pub struct PipelineSignals {
    pub rate_limiter: BucketSnapshot,
    pub cache: CacheStats,
    pub breaker: Option<BreakerSnapshot>,
}

pub struct RequestPipelineBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
}

impl RequestPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            transport: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Inject a custom transport (tests, instrumentation). Defaults to
    /// [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<RequestPipeline> {
        self.config.validate()?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new().map_err(|e| {
                Error::network(
                    e.to_string(),
                    ErrorContext::new().with_source("transport"),
                )
            })?),
        };
        Ok(RequestPipeline {
            rate_limiter: Arc::new(RateLimiter::new(self.config.rate_limit.clone())),
            cache: Arc::new(CacheManager::new(self.config.cache.clone())),
            registry: Arc::new(ModelRegistry::new(self.config.registry.clone())?),
            breaker: self
                .config
                .breaker
                .clone()
                .map(|cfg| Arc::new(CircuitBreaker::new(cfg))),
            retry: RetryPolicy::new(self.config.retry.clone()),
            transport,
        })
    }
}

impl Default for RequestPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<CacheManager>,
    registry: Arc<ModelRegistry>,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: RetryPolicy,
}

impl RequestPipeline {
    pub fn new(config: Config) -> Result<Self> {
        RequestPipelineBuilder::new().config(config).build()
    }

    pub fn builder() -> RequestPipelineBuilder {
        RequestPipelineBuilder::new()
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Validate and register a model identifier against a fresh registry.
    pub async fn resolve_model(&self, name: &str) -> Result<String> {
        self.registry.ensure_fresh().await;
        self.registry.resolve(name)
    }

    pub async fn signals(&self, endpoint_class: &str) -> PipelineSignals {
        PipelineSignals {
            rate_limiter: self.rate_limiter.snapshot(endpoint_class).await,
            cache: self.cache.stats(),
            breaker: self.breaker.as_ref().map(|b| b.snapshot(endpoint_class)),
        }
    }

    /// Run one request through admission, cache, retrying network call, and
    /// classification.
    pub async fn execute(&self, request: ApiRequest) -> Result<WireResponse> {
        let class = if request.endpoint_class.is_empty() {
            DEFAULT_CLASS.to_string()
        } else {
            request.endpoint_class.clone()
        };
        let redacted_url = redact(&request.url);
        let base_context = ErrorContext::new()
            .with_operation("execute")
            .with_method(request.method.as_str())
            .with_url(redacted_url.clone());

        // Reject malformed caller input before it consumes admission budget.
        if let Err(e) = url::Url::parse(&request.url) {
            return Err(Error::validation_for_parameter(
                format!("invalid request URL: {}", e),
                "url",
                base_context.clone().with_source("pipeline"),
            ));
        }

        // Admission first; a denied request must not touch the network.
        let admitted = self
            .rate_limiter
            .acquire_with_wait(&class, 1.0, self.rate_limiter.admission_timeout())
            .await;
        if !admitted {
            let hint = self.rate_limiter.time_until_available(&class, 1.0).await;
            warn!(endpoint_class = %class, url = %redacted_url, "admission denied by rate limiter");
            return Err(Error::rate_limit(
                format!("rate limit exceeded for endpoint class \"{}\"", class),
                hint,
                base_context
                    .clone()
                    .with_source("rate_limiter")
                    .with_suggestion("reduce request rate or raise the configured budget"),
            ));
        }

        let cache_key = (request.cacheable && self.cache.is_enabled()).then(|| {
            request_cache_key(
                request.content_class.dir(),
                request.method.as_str(),
                &request.url,
                request.body.as_deref(),
            )
        });
        if let Some(key) = &cache_key {
            if let Some(data) = self.cache.get(key).await {
                if let Some(resp) = decode_response(&data) {
                    debug!(url = %redacted_url, "response served from cache");
                    return Ok(resp);
                }
                warn!(url = %redacted_url, "cached entry undecodable; refetching");
            }
        }

        let request_id = Uuid::new_v4().to_string();
        let wire = WireRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        };

        let mut attempt: u32 = 0;
        loop {
            if let Some(breaker) = &self.breaker {
                if let Err(remaining) = breaker.allow(&class) {
                    return Err(Error::rate_limit(
                        "circuit open after consecutive upstream failures",
                        Some(remaining),
                        base_context
                            .clone()
                            .with_source("circuit_breaker")
                            .with_suggestion("wait out the cooldown before retrying"),
                    ));
                }
            }

            let started = Instant::now();
            let error = match self.transport.send(&wire).await {
                Ok(resp) if resp.is_success() => {
                    self.record_outcome(&class, true);
                    if resp.body.is_empty() {
                        return Err(Error::EmptyResponse {
                            message: "upstream returned a well-formed but empty response".into(),
                            context: base_context
                                .clone()
                                .with_status_code(resp.status)
                                .with_suggestion("adjust request parameters before retrying"),
                        });
                    }
                    info!(
                        method = %request.method,
                        url = %redacted_url,
                        status = resp.status,
                        attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        request_id = %request_id,
                        "request succeeded"
                    );
                    if let Some(key) = &cache_key {
                        match encode_response(&resp) {
                            Ok(data) => {
                                self.cache.set(key, request.content_class, &data).await;
                            }
                            Err(e) => warn!(error = %e, "response not cacheable; skipping"),
                        }
                    }
                    return Ok(resp);
                }
                Ok(resp) => {
                    // Only infrastructure-level failures trip the breaker;
                    // 4xx means upstream is healthy and said no.
                    self.record_outcome(&class, resp.status < 500);
                    classify_http_failure(&resp, base_context.clone())
                }
                Err(transport_error) => {
                    self.record_outcome(&class, false);
                    classify_transport_failure(transport_error, base_context.clone())
                }
            };

            warn!(
                method = %request.method,
                url = %redacted_url,
                kind = error.kind(),
                attempt,
                duration_ms = started.elapsed().as_millis() as u64,
                request_id = %request_id,
                "request attempt failed"
            );

            match self.retry.should_retry(&error, attempt) {
                Some(delay) => {
                    debug!(
                        delay_ms = delay.as_millis() as u64,
                        attempt, "backing off before retry"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                None => return Err(error),
            }
        }
    }

    fn record_outcome(&self, class: &str, success: bool) {
        if let Some(breaker) = &self.breaker {
            if success {
                breaker.on_success(class);
            } else {
                breaker.on_failure(class);
            }
        }
    }
}

fn classify_http_failure(resp: &WireResponse, context: ErrorContext) -> Error {
    let status = resp.status;
    let preview = redact(&resp.body_preview(BODY_PREVIEW_LEN));
    let context = context.with_status_code(status);

    match status {
        400 => {
            // Surface the offending parameter when the body names one.
            let parameter = serde_json::from_slice::<serde_json::Value>(&resp.body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/param")
                        .and_then(|p| p.as_str())
                        .map(str::to_string)
                });
            Error::Validation {
                message: preview,
                parameter,
                context,
            }
        }
        401 => Error::Authentication {
            message: preview,
            context: context.with_suggestion("verify the API key configured for this provider"),
        },
        402 => Error::PaymentRequired {
            message: preview,
            context: context.with_suggestion("check the account balance or billing plan"),
        },
        429 => Error::RateLimit {
            message: preview,
            retry_after: resp.retry_after(),
            context: context.with_suggestion("honor retry_after before sending more requests"),
        },
        520 => Error::UnknownEdge {
            message: preview,
            context,
        },
        s if is_retryable_status(s) => Error::ServiceUnavailable {
            status: s,
            message: preview,
            retry_after: resp.retry_after(),
            context,
        },
        s => Error::Api {
            status: s,
            message: preview,
            context,
        },
    }
}

fn classify_transport_failure(error: TransportError, context: ErrorContext) -> Error {
    match error {
        TransportError::Timeout(message) => Error::timeout(message, context.with_source("transport")),
        TransportError::Connect(message) => Error::network(message, context.with_source("transport")),
        // A request that cannot be built is caller input, not weather.
        TransportError::Build(message) => Error::validation(message, context.with_source("transport")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::resilience::{CircuitBreakerConfig, RateLimitConfig};
    use super::retry::RetryConfig;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    /// Transport stub that replays a scripted sequence of outcomes.
    struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<WireResponse, TransportError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<std::result::Result<WireResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _request: &WireRequest,
        ) -> std::result::Result<WireResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(status_response(200, "fallback")))
        }
    }

    fn status_response(status: u16, body: &str) -> WireResponse {
        WireResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.as_bytes().to_vec()),
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(3)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(50))
    }

    fn pipeline_with(
        transport: Arc<ScriptedTransport>,
        config: Config,
    ) -> RequestPipeline {
        RequestPipeline::builder()
            .config(config)
            .transport(transport)
            .build()
            .unwrap()
    }

    fn base_config() -> Config {
        Config::new()
            .with_retry(fast_retry())
            .with_rate_limit(
                RateLimitConfig::new()
                    .with_requests_per_minute(6000.0)
                    .with_burst_capacity(100.0),
            )
    }

    #[tokio::test]
    async fn test_transient_503s_then_success() {
        let transport = ScriptedTransport::new(vec![
            Ok(status_response(503, "down")),
            Ok(status_response(503, "down")),
            Ok(status_response(200, "{\"ok\":true}")),
        ]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let started = Instant::now();
        let resp = pipeline
            .execute(ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec()))
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(transport.calls(), 3);
        // Two backoff sleeps: 10ms + 20ms.
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_authentication_failure_never_retried() {
        let transport = ScriptedTransport::new(vec![Ok(status_response(401, "bad key"))]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let err = pipeline
            .execute(ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "authentication");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_upstream_429_carries_retry_after() {
        let transport = ScriptedTransport::new(vec![Ok(WireResponse {
            status: 429,
            headers: HashMap::from([("retry-after".to_string(), "7".to_string())]),
            body: Bytes::from_static(b"slow down"),
        })]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let err = pipeline
            .execute(ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "rate_limit");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_edge_520_is_retried() {
        let transport = ScriptedTransport::new(vec![
            Ok(status_response(520, "edge hiccup")),
            Ok(status_response(200, "ok")),
        ]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let resp = pipeline
            .execute(ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec()))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_generic_500_fails_without_retry() {
        let transport = ScriptedTransport::new(vec![Ok(status_response(500, "boom"))]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let err = pipeline
            .execute(ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "api");
        assert_eq!(err.status(), Some(500));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_network_errors_consume_retry_budget_then_surface() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
        ]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let err = pipeline
            .execute(ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network");
        // Initial attempt + max_retries.
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_empty_success_body_is_classified() {
        let transport = ScriptedTransport::new(vec![Ok(status_response(200, ""))]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let err = pipeline
            .execute(ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "empty_response");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_validation_error_extracts_parameter() {
        let transport = ScriptedTransport::new(vec![Ok(status_response(
            400,
            r#"{"error": {"message": "bad temperature", "param": "temperature"}}"#,
        ))]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let err = pipeline
            .execute(ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec()))
            .await
            .unwrap_err();
        match err {
            Error::Validation { parameter, .. } => {
                assert_eq!(parameter.as_deref(), Some("temperature"))
            }
            other => panic!("expected validation error, got {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_malformed_url_rejected_before_network() {
        let transport = ScriptedTransport::new(vec![]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let err = pipeline
            .execute(ApiRequest::get("not a url"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_cacheable_get_served_from_cache() {
        let transport = ScriptedTransport::new(vec![Ok(status_response(200, "models"))]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let req = ApiRequest::get("https://api.example.com/v1/models");
        let first = pipeline.execute(req.clone()).await.unwrap();
        let second = pipeline.execute(req).await.unwrap();

        assert_eq!(first.status, 200);
        assert_eq!(second.body, first.body);
        assert_eq!(transport.calls(), 1);
        assert_eq!(pipeline.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_goes_to_network() {
        let transport = ScriptedTransport::new(vec![
            Ok(status_response(200, "a")),
            Ok(status_response(200, "b")),
        ]);
        let config = base_config().with_cache(CacheConfig::new().with_enabled(false));
        let pipeline = pipeline_with(transport.clone(), config);

        let req = ApiRequest::get("https://api.example.com/v1/models");
        pipeline.execute(req.clone()).await.unwrap();
        pipeline.execute(req).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_post_not_cached_by_default() {
        let transport = ScriptedTransport::new(vec![
            Ok(status_response(200, "a")),
            Ok(status_response(200, "b")),
        ]);
        let pipeline = pipeline_with(transport.clone(), base_config());

        let req = ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec());
        pipeline.execute(req.clone()).await.unwrap();
        pipeline.execute(req).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_admission_denial_is_local_rate_limit() {
        let transport = ScriptedTransport::new(vec![
            Ok(status_response(200, "a")),
            Ok(status_response(200, "b")),
        ]);
        let config = base_config().with_rate_limit(
            RateLimitConfig::new()
                .with_requests_per_minute(6.0)
                .with_burst_capacity(1.0)
                .with_admission_timeout(Duration::ZERO),
        );
        let pipeline = pipeline_with(transport.clone(), config);

        let req = ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec());
        pipeline.execute(req.clone()).await.unwrap();

        let err = pipeline.execute(req).await.unwrap_err();
        assert_eq!(err.kind(), "rate_limit");
        assert!(err.retry_after().is_some());
        // The denied request never reached the transport.
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Connect("refused".into())),
            Ok(status_response(200, "never reached")),
        ]);
        let config = base_config()
            .with_retry(RetryConfig::new().with_max_retries(0))
            .with_breaker(
                CircuitBreakerConfig::new()
                    .with_failure_threshold(1)
                    .with_cooldown(Duration::from_secs(60)),
            );
        let pipeline = pipeline_with(transport.clone(), config);

        let req = ApiRequest::post("https://api.example.com/v1/chat", b"{}".to_vec());
        let first = pipeline.execute(req.clone()).await.unwrap_err();
        assert_eq!(first.kind(), "network");

        let second = pipeline.execute(req).await.unwrap_err();
        assert_eq!(second.kind(), "rate_limit");
        assert!(second.retry_after().is_some());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_signals_snapshot() {
        let transport = ScriptedTransport::new(vec![Ok(status_response(200, "ok"))]);
        let pipeline = pipeline_with(transport, base_config());
        pipeline
            .execute(ApiRequest::get("https://api.example.com/v1/models"))
            .await
            .unwrap();

        let signals = pipeline.signals(DEFAULT_CLASS).await;
        assert_eq!(signals.rate_limiter.capacity, 100.0);
        assert!(signals.cache.misses >= 1);
        assert!(signals.breaker.is_none());
    }

    #[test]
    fn test_cached_response_roundtrip() {
        let resp = WireResponse {
            status: 200,
            headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: Bytes::from_static(b"\x00\x01binary ok\xff"),
        };
        let encoded = encode_response(&resp).unwrap();
        let decoded = decode_response(&encoded).unwrap();
        assert_eq!(decoded.status, 200);
        assert_eq!(decoded.body, resp.body);
        assert_eq!(decoded.header("content-type"), Some("application/json"));
    }
}
