use std::time::Duration;
use thiserror::Error;

/// Structured error context attached to surfaced failures.
///
/// Everything here is safe to log: URLs and bodies are redacted before they
/// reach a context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Logical operation that failed (e.g., "execute", "model_catalog_fetch").
    pub operation: Option<String>,
    /// Redacted request URL.
    pub url: Option<String>,
    /// HTTP method of the failed request.
    pub method: Option<String>,
    /// Upstream HTTP status code, when one was received.
    pub status_code: Option<u16>,
    /// Actionable hint for the caller.
    pub suggestion: Option<String>,
    /// Component that produced the error (e.g., "rate_limiter", "transport").
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the resilience core.
///
/// Callers see exactly one typed error per failed request; raw transport
/// exceptions never cross this boundary. Retry policy is derived from the
/// variant via [`Error::is_retryable`].
#[derive(Debug, Error)]
pub enum Error {
    /// Connect/DNS/transport-level failure. Retried within the backoff budget.
    #[error("network error: {message}{}", format_context(.context))]
    Network {
        message: String,
        context: ErrorContext,
    },

    /// An operation exceeded its deadline. Retried within the backoff budget.
    #[error("timeout: {message}{}", format_context(.context))]
    Timeout {
        message: String,
        context: ErrorContext,
    },

    /// Admission denied locally or upstream 429. Never retried internally;
    /// `retry_after` tells the caller when a retry may succeed.
    #[error("rate limited: {message}{}", format_context(.context))]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
        context: ErrorContext,
    },

    /// Upstream 401. Deterministic; never retried.
    #[error("authentication failed: {message}{}", format_context(.context))]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    /// Upstream 402. Deterministic; never retried.
    #[error("payment required: {message}{}", format_context(.context))]
    PaymentRequired {
        message: String,
        context: ErrorContext,
    },

    /// Malformed caller input or upstream 400. Carries the offending
    /// parameter when known. Never retried.
    #[error("validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        parameter: Option<String>,
        context: ErrorContext,
    },

    /// Well-formed but semantically empty result. Surfaced so the caller can
    /// adjust parameters; never retried automatically.
    #[error("empty response: {message}{}", format_context(.context))]
    EmptyResponse {
        message: String,
        context: ErrorContext,
    },

    /// Transient upstream/edge failure from the retryable status allow-list
    /// (502/503/504/522/524). Retried within the backoff budget.
    #[error("service unavailable (HTTP {status}): {message}{}", format_context(.context))]
    ServiceUnavailable {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
        context: ErrorContext,
    },

    /// HTTP 520 — the edge proxy saw an unknown error from the origin.
    /// Classified apart from generic 5xx because it is a known-transient
    /// infrastructure hiccup. Retried within the backoff budget.
    #[error("unknown edge error: {message}{}", format_context(.context))]
    UnknownEdge {
        message: String,
        context: ErrorContext,
    },

    /// Any other HTTP failure. Carries the original status and a redacted
    /// body preview; surfaced after at most one attempt.
    #[error("API error (HTTP {status}): {message}{}", format_context(.context))]
    Api {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref op) = ctx.operation {
        parts.push(format!("operation: {}", op));
    }
    if let Some(ref method) = ctx.method {
        parts.push(format!("method: {}", method));
    }
    if let Some(ref url) = ctx.url {
        parts.push(format!("url: {}", url));
    }
    if let Some(status) = ctx.status_code {
        parts.push(format!("status: {}", status));
    }
    if let Some(ref hint) = ctx.suggestion {
        parts.push(format!("hint: {}", hint));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn network(message: impl Into<String>, context: ErrorContext) -> Self {
        Error::Network {
            message: message.into(),
            context,
        }
    }

    pub fn timeout(message: impl Into<String>, context: ErrorContext) -> Self {
        Error::Timeout {
            message: message.into(),
            context,
        }
    }

    pub fn rate_limit(
        message: impl Into<String>,
        retry_after: Option<Duration>,
        context: ErrorContext,
    ) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
            context,
        }
    }

    pub fn validation(message: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: message.into(),
            parameter: None,
            context,
        }
    }

    pub fn validation_for_parameter(
        message: impl Into<String>,
        parameter: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Error::Validation {
            message: message.into(),
            parameter: Some(parameter.into()),
            context,
        }
    }

    /// Short stable kind tag, used for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Network { .. } => "network",
            Error::Timeout { .. } => "timeout",
            Error::RateLimit { .. } => "rate_limit",
            Error::Authentication { .. } => "authentication",
            Error::PaymentRequired { .. } => "payment_required",
            Error::Validation { .. } => "validation",
            Error::EmptyResponse { .. } => "empty_response",
            Error::ServiceUnavailable { .. } => "service_unavailable",
            Error::UnknownEdge { .. } => "unknown_edge",
            Error::Api { .. } => "api",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Whether the pipeline may retry this failure within its backoff budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network { .. }
                | Error::Timeout { .. }
                | Error::ServiceUnavailable { .. }
                | Error::UnknownEdge { .. }
        )
    }

    /// Upstream or locally computed hint for when a retry may succeed.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimit { retry_after, .. } => *retry_after,
            Error::ServiceUnavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Network { context, .. }
            | Error::Timeout { context, .. }
            | Error::RateLimit { context, .. }
            | Error::Authentication { context, .. }
            | Error::PaymentRequired { context, .. }
            | Error::Validation { context, .. }
            | Error::EmptyResponse { context, .. }
            | Error::ServiceUnavailable { context, .. }
            | Error::UnknownEdge { context, .. }
            | Error::Api { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Upstream HTTP status, when the error wraps one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ServiceUnavailable { status, .. } | Error::Api { status, .. } => Some(*status),
            _ => self.context().and_then(|c| c.status_code),
        }
    }
}
