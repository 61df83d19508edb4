//! `reqwest`-backed transport.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Proxy;

use super::{Method, Transport, TransportError, WireRequest, WireResponse};

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with production-friendly defaults, overridable via
    /// environment:
    /// - `AI_RESILIENCE_HTTP_TIMEOUT_SECS` (default 30)
    /// - `AI_RESILIENCE_POOL_MAX_IDLE_PER_HOST` (default 32)
    /// - `AI_RESILIENCE_PROXY_URL`
    pub fn new() -> Result<Self, TransportError> {
        let timeout_secs = env::var("AI_RESILIENCE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("AI_RESILIENCE_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("AI_RESILIENCE_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse, TransportError> {
        let mut req = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Stream => self
                .client
                .post(&request.url)
                .header("accept", "text/event-stream"),
        };

        for (name, value) in &request.headers {
            req = req.header(name, value);
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        let resp = req.send().await.map_err(map_reqwest_error)?;

        let status = resp.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), v.to_string());
            }
        }

        let body = resp.bytes().await.map_err(map_reqwest_error)?;
        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_builder() {
        TransportError::Build(e.to_string())
    } else {
        // Connect, body, and decode failures all mean the exchange did not
        // complete; the pipeline treats them uniformly as network failures.
        TransportError::Connect(e.to_string())
    }
}
