//! Error types for the API client.
//!
//! # Design
//! `ApiError` separates the failures the dispatcher may absorb by retrying
//! (`Timeout`, `ConnectionError`, `HttpError` with status 502) from everything
//! else, which always surfaces unchanged. `HttpError` keeps the raw status,
//! reason and body so callers can inspect or translate it.
//!
//! `Domain` is never produced by the client on its own. It only appears when
//! a caller runs a call through an `ErrorTranslator`.

use std::borrow::Cow;
use std::time::Duration;

/// Errors returned by the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No complete response arrived within the per-attempt timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// DNS failure, refused, reset or otherwise broken connection.
    #[error("connection failed: {0}")]
    ConnectionError(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} {reason}: {body}")]
    HttpError {
        status: u16,
        reason: String,
        body: String,
    },

    /// Any other failure of the underlying HTTP stack.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A status error translated against a caller-supplied candidate set.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The response body could not be deserialized.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// A field accessed on a response envelope does not exist.
    #[error("missing field `{0}` in response")]
    MissingField(String),

    /// Reading or writing the response cache failed.
    #[error("cache `{name}`: {source}")]
    CacheError {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Client configuration is incomplete or malformed.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    /// Status code carried by an `HttpError`.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Classification used by the retry loop.
pub trait Retryable {
    /// Whether repeating the same request may succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for ApiError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout(_) | ApiError::ConnectionError(_) | ApiError::HttpError { status: 502, .. }
        )
    }
}

/// An error meaningful to the calling application, keyed by status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DomainError {
    pub code: u16,
    pub message: Cow<'static, str>,
}

impl DomainError {
    pub const fn new(code: u16, message: &'static str) -> Self {
        Self {
            code,
            message: Cow::Borrowed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ApiError {
        ApiError::HttpError {
            status,
            reason: String::new(),
            body: String::new(),
        }
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(ApiError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(ApiError::ConnectionError("reset".to_string()).is_retryable());
        assert!(http(502).is_retryable());
    }

    #[test]
    fn other_statuses_are_not_retryable() {
        for status in [400, 401, 404, 429, 500, 503, 504] {
            assert!(!http(status).is_retryable(), "status {status}");
        }
    }

    #[test]
    fn non_transport_errors_are_not_retryable() {
        assert!(!ApiError::TransportError("tls".to_string()).is_retryable());
        assert!(!ApiError::SerializationError("bad".to_string()).is_retryable());
        assert!(!ApiError::Domain(DomainError::new(404, "gone")).is_retryable());
    }

    #[test]
    fn http_error_display_includes_status_and_body() {
        let err = ApiError::HttpError {
            status: 404,
            reason: "Not Found".to_string(),
            body: r#"{"error":"NotFound"}"#.to_string(),
        };
        assert_eq!(err.to_string(), r#"HTTP 404 Not Found: {"error":"NotFound"}"#);
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn domain_error_displays_its_message() {
        const NOT_FOUND: DomainError = DomainError::new(404, "Task not found");
        assert_eq!(ApiError::from(NOT_FOUND).to_string(), "Task not found");
    }
}
