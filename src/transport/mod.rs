//! HTTP transport seam.
//!
//! The pipeline talks to the network through the [`Transport`] trait and
//! dispatches on [`TransportError`]'s explicit tags — it never inspects a
//! transport library's error shape. HTTP status failures are not transport
//! errors: any received response comes back as a [`WireResponse`] and is
//! classified by the pipeline.

mod http;

pub use http::HttpTransport;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

/// Verb capability set required from a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    /// POST with server-sent-events accept header; used by streaming
    /// endpoints. Response handling above this seam is out of scope here.
    Stream,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Stream => "STREAM",
        }
    }

    /// GET-like requests are safe to serve from cache.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Best-effort `Retry-After: <seconds>` parsing.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        let secs: u64 = self.header("retry-after")?.trim().parse().ok()?;
        Some(std::time::Duration::from_secs(secs))
    }

    /// Lossy body prefix for error messages and logs. Callers redact it
    /// before surfacing.
    pub fn body_preview(&self, max_len: usize) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let mut preview: String = text.chars().take(max_len).collect();
        if text.chars().count() > max_len {
            preview.push_str("...");
        }
        preview
    }
}

/// Transport-level failures, tagged so the pipeline can classify without
/// introspecting the underlying client's error type.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request could not be built: {0}")]
    Build(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> std::result::Result<WireResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_idempotence() {
        assert!(Method::Get.is_idempotent());
        assert!(!Method::Post.is_idempotent());
        assert!(!Method::Stream.is_idempotent());
    }

    #[test]
    fn test_response_header_lookup_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), "3".to_string());
        let resp = WireResponse {
            status: 429,
            headers,
            body: Bytes::new(),
        };
        assert_eq!(resp.header("retry-after"), Some("3"));
        assert_eq!(resp.retry_after(), Some(std::time::Duration::from_secs(3)));
    }

    #[test]
    fn test_body_preview_truncates() {
        let resp = WireResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(vec![b'x'; 500]),
        };
        let preview = resp.body_preview(100);
        assert!(preview.len() <= 103);
        assert!(preview.ends_with("..."));
    }
}
