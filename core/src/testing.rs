//! Scripted transport shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Replays queued outcomes and records every request it is handed. Once the
/// script runs dry it answers `200 {"success": true, "data": {}}`.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
    sent: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_json(self, body: Value) -> Self {
        self.push(Ok(ok(&body.to_string())))
    }

    pub fn respond_text(self, body: &str) -> Self {
        self.push(Ok(ok(body)))
    }

    pub fn fail(self, err: ApiError) -> Self {
        self.push(Err(err))
    }

    pub fn fail_status(self, status: u16) -> Self {
        self.fail(http_error(status))
    }

    pub fn fail_times(mut self, times: usize, make: impl Fn() -> ApiError) -> Self {
        for _ in 0..times {
            self = self.fail(make());
        }
        self
    }

    fn push(self, outcome: Result<HttpResponse, ApiError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().iter().map(|(_, req)| req.clone()).collect()
    }

    /// Gaps between the start of consecutive sends.
    pub fn gaps(&self) -> Vec<Duration> {
        let sent = self.sent.lock().unwrap();
        sent.windows(2).map(|pair| pair[1].0 - pair[0].0).collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self.sent.lock().unwrap().push((Instant::now(), request.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ok(r#"{"success":true,"data":{}}"#)))
    }
}

pub fn ok(body: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        reason: "OK".to_string(),
        headers: Vec::new(),
        body: body.to_string(),
    }
}

pub fn http_error(status: u16) -> ApiError {
    ApiError::HttpError {
        status,
        reason: "scripted".to_string(),
        body: format!(r#"{{"success":false,"error":"E{status}"}}"#),
    }
}

pub fn timeout() -> ApiError {
    ApiError::Timeout(Duration::from_secs(10))
}

pub fn connection_reset() -> ApiError {
    ApiError::ConnectionError("connection reset by peer".to_string())
}
