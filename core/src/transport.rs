//! One HTTP round trip per `send`.
//!
//! # Design
//! `Transport` is the I/O seam: the dispatcher above it owns pacing and the
//! retry budget, the transport only performs a single attempt and reports
//! its outcome as an `ApiError` kind. `UreqTransport` is the production
//! implementation; tests plug in scripted transports instead.
//!
//! Beneath one attempt, `UreqTransport` quietly repeats idempotent requests
//! whose connection was reset before a response arrived. That layer is
//! bounded by `ConnectRetry` and is invisible to the dispatcher's budget.

use std::fmt;
use std::io;
use std::thread;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::config::{ConnectRetry, Credentials};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Performs exactly one logical round trip.
pub trait Transport {
    /// Send `request` once. Non-2xx responses come back as
    /// `ApiError::HttpError`.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).send(request)
    }
}

/// `Transport` backed by a blocking `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: Url,
    headers: Vec<(String, String)>,
    timeout: Duration,
    connect_retry: ConnectRetry,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| match name.as_str() {
                "x-api-key" => (name.as_str(), "<redacted>"),
                _ => (name.as_str(), value.as_str()),
            })
            .collect();
        f.debug_struct("UreqTransport")
            .field("base_url", &self.base_url.as_str())
            .field("headers", &headers)
            .field("timeout", &self.timeout)
            .field("connect_retry", &self.connect_retry)
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(credentials: &Credentials, timeout: Duration, connect_retry: ConnectRetry) -> Result<Self, ApiError> {
        let base_url = Url::parse(&credentials.base_url)
            .map_err(|e| ApiError::ConfigError(format!("invalid base URL `{}`: {e}", credentials.base_url)))?;
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();
        let headers = vec![
            ("x-api-user".to_string(), credentials.user_id.clone()),
            ("x-api-key".to_string(), credentials.api_key.clone()),
            ("x-client".to_string(), credentials.client_header()),
            ("content-type".to_string(), "application/json".to_string()),
        ];
        Ok(Self {
            agent,
            base_url,
            headers,
            timeout,
            connect_retry,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn round_trip(&self, method: HttpMethod, url: &str, body: Option<&[u8]>) -> Result<HttpResponse, ureq::Error> {
        let mut response = match method {
            HttpMethod::Get => self.with_headers(self.agent.get(url)).call(),
            HttpMethod::Delete => self.with_headers(self.agent.delete(url)).call(),
            HttpMethod::Post => send_with_body(self.with_headers(self.agent.post(url)), body),
            HttpMethod::Put => send_with_body(self.with_headers(self.agent.put(url)), body),
        }?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.body_mut().read_to_string()?;

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }

    fn with_headers<B>(&self, mut builder: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder
    }

    fn classify(&self, err: ureq::Error) -> ApiError {
        match err {
            ureq::Error::Timeout(_) => ApiError::Timeout(self.timeout),
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => ApiError::ConnectionError(err.to_string()),
            ureq::Error::Io(ref e) if e.kind() == io::ErrorKind::TimedOut => ApiError::Timeout(self.timeout),
            ureq::Error::Io(ref e) if is_connection_failure(e.kind()) => ApiError::ConnectionError(e.to_string()),
            other => ApiError::TransportError(other.to_string()),
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = request.url(&self.base_url)?;
        let body = request
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;

        let mut resets = 0;
        let response = loop {
            debug!(method = %request.method, url = %url, "sending request");
            match self.round_trip(request.method, url.as_str(), body.as_deref()) {
                Err(err) if is_reset(&err) && request.method.is_idempotent() && resets < self.connect_retry.attempts => {
                    let delay = self.connect_retry.delay_for(resets);
                    debug!(error = %err, resets, delay_ms = delay.as_millis() as u64, "connection reset, reconnecting");
                    thread::sleep(delay);
                    resets += 1;
                }
                Err(err) => return Err(self.classify(err)),
                Ok(response) => break response,
            }
        };

        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::HttpError {
                status: response.status,
                reason: response.reason,
                body: response.body,
            })
        }
    }
}

fn send_with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}

fn is_reset(err: &ureq::Error) -> bool {
    matches!(
        err,
        ureq::Error::Io(e) if matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
        )
    )
}

fn is_connection_failure(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> UreqTransport {
        let credentials = Credentials::new("http://localhost:3000/api/v3", "user-1", "key-1");
        UreqTransport::new(&credentials, Duration::from_secs(10), ConnectRetry::default()).unwrap()
    }

    #[test]
    fn static_headers_carry_credentials() {
        let transport = transport();
        let names: Vec<&str> = transport.headers.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["x-api-user", "x-api-key", "x-client", "content-type"]);
        assert_eq!(transport.headers[0].1, "user-1");
        assert_eq!(transport.headers[1].1, "key-1");
        assert_eq!(transport.headers[2].1, "user-1-habitica-core");
        assert_eq!(transport.headers[3].1, "application/json");
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let transport = transport();
        let printed = format!("{transport:?}");
        assert!(!printed.contains("key-1"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("user-1"));
        assert_eq!(transport.base_url().as_str(), "http://localhost:3000/api/v3");
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let credentials = Credentials::new("not a url", "u", "k");
        let err = UreqTransport::new(&credentials, Duration::from_secs(1), ConnectRetry::default()).unwrap_err();
        assert!(matches!(err, ApiError::ConfigError(_)));
    }

    #[test]
    fn ureq_failures_map_to_transport_kinds() {
        let transport = transport();
        assert!(matches!(transport.classify(ureq::Error::HostNotFound), ApiError::ConnectionError(_)));
        assert!(matches!(transport.classify(ureq::Error::ConnectionFailed), ApiError::ConnectionError(_)));
        let refused = ureq::Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(matches!(transport.classify(refused), ApiError::ConnectionError(_)));
        let timed_out = ureq::Error::Io(io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(transport.classify(timed_out), ApiError::Timeout(_)));
        let other = ureq::Error::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(transport.classify(other), ApiError::TransportError(_)));
    }

    #[test]
    fn only_resets_trigger_reconnect() {
        assert!(is_reset(&ureq::Error::Io(io::Error::from(io::ErrorKind::ConnectionReset))));
        assert!(is_reset(&ureq::Error::Io(io::Error::from(io::ErrorKind::BrokenPipe))));
        assert!(!is_reset(&ureq::Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused))));
        assert!(!is_reset(&ureq::Error::HostNotFound));
    }
}
