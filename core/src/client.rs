//! Caller-facing API client.
//!
//! # Design
//! `ApiClient` keeps the split between building a request and parsing its
//! response: `build_request` produces a plain `HttpRequest`, the dispatcher
//! executes it, and `parse_json`/`parse_text` turn the raw response into the
//! caller's value. Between dispatch and parse the observation hook sees the
//! full body. Cached reads bypass dispatch and therefore the hook.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cache::ResponseCache;
use crate::config::{ClientConfig, Credentials};
use crate::dispatch::RetryingDispatcher;
use crate::envelope::ResponseEnvelope;
use crate::error::ApiError;
use crate::hook::{HookError, HookSlot};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, ResponseFormat};
use crate::pacing::PacedScheduler;
use crate::transport::{Transport, UreqTransport};

/// Paced, retrying client for the remote API.
pub struct ApiClient<T = UreqTransport> {
    dispatcher: RetryingDispatcher<T>,
    cache: ResponseCache,
    hook: HookSlot<T>,
}

impl ApiClient<UreqTransport> {
    /// Client with the batch (`true`) or interactive (`false`) pacing profile.
    pub fn new(credentials: Credentials, batch: bool) -> Result<Self, ApiError> {
        Self::with_config(credentials, ClientConfig::for_mode(batch))
    }

    pub fn with_config(credentials: Credentials, config: ClientConfig) -> Result<Self, ApiError> {
        let transport = UreqTransport::new(&credentials, config.timeout, config.connect_retry)?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        let scheduler = PacedScheduler::new(config.pacing);
        Self {
            dispatcher: RetryingDispatcher::new(transport, scheduler, config.retry_ceiling),
            cache: ResponseCache::new(config.cache_dir, config.cache_ttl),
            hook: HookSlot::new(),
        }
    }

    pub fn transport(&self) -> &T {
        self.dispatcher.transport()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Register the observation hook, replacing any previous one.
    pub fn set_hook<F>(&self, hook: F)
    where
        F: Fn(&ApiClient<T>, &Value) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hook.set(Arc::new(hook));
    }

    pub fn clear_hook(&self) {
        self.hook.clear();
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_set()
    }

    pub fn get(&self, path: &[&str], query: &[(&str, &str)]) -> Result<ResponseEnvelope, ApiError> {
        self.call(HttpMethod::Get, path, query, None)
    }

    pub fn post<B: Serialize + ?Sized>(
        &self,
        path: &[&str],
        body: &B,
        query: &[(&str, &str)],
    ) -> Result<ResponseEnvelope, ApiError> {
        self.call(HttpMethod::Post, path, query, Some(to_body(body)?))
    }

    pub fn put<B: Serialize + ?Sized>(
        &self,
        path: &[&str],
        body: &B,
        query: &[(&str, &str)],
    ) -> Result<ResponseEnvelope, ApiError> {
        self.call(HttpMethod::Put, path, query, Some(to_body(body)?))
    }

    pub fn delete(&self, path: &[&str], query: &[(&str, &str)]) -> Result<ResponseEnvelope, ApiError> {
        self.call(HttpMethod::Delete, path, query, None)
    }

    /// Issue a request and parse the response as JSON.
    pub fn call(
        &self,
        method: HttpMethod,
        path: &[&str],
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<ResponseEnvelope, ApiError> {
        let request = build_request(method, path, query, body, ResponseFormat::Json);
        let response = self.dispatcher.dispatch(&request)?;
        let parsed = parse_json(&response)?;
        self.hook.fire(self, &parsed);
        Ok(ResponseEnvelope::from_body(parsed))
    }

    /// Issue a request and return the response body untouched.
    pub fn call_text(
        &self,
        method: HttpMethod,
        path: &[&str],
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<String, ApiError> {
        let request = build_request(method, path, query, body, ResponseFormat::Text);
        let response = self.dispatcher.dispatch(&request)?;
        let text = parse_text(response);
        self.hook.fire(self, &Value::String(text.clone()));
        Ok(text)
    }

    /// `get` through the response cache under `cache_name`.
    pub fn cached(
        &self,
        cache_name: &str,
        path: &[&str],
        query: &[(&str, &str)],
    ) -> Result<ResponseEnvelope, ApiError> {
        self.cache.get_or_fetch(cache_name, || self.get(path, query))
    }
}

/// Describe a call as plain data.
pub fn build_request(
    method: HttpMethod,
    path: &[&str],
    query: &[(&str, &str)],
    body: Option<Value>,
    format: ResponseFormat,
) -> HttpRequest {
    let request = HttpRequest::new(method, path).with_query(query).with_format(format);
    match body {
        Some(body) => request.with_body(body),
        None => request,
    }
}

/// Parse a successful response body. An empty body reads as `null`.
pub fn parse_json(response: &HttpResponse) -> Result<Value, ApiError> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

pub fn parse_text(response: HttpResponse) -> String {
    response.body
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::SerializationError(e.to_string()))
}
