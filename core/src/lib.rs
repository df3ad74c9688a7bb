//! Resilient, paced HTTP client core for the Habitica API.
//!
//! # Overview
//! Turns logical calls (`get`, `post`, `put`, `delete`) into paced,
//! retried round trips against a rate-limited service, and hands back
//! parsed bodies through `ResponseEnvelope`.
//!
//! # Design
//! - `PacedScheduler` spaces dispatches per client, with per-verb intervals.
//! - `Transport` performs one round trip; `UreqTransport` is the blocking
//!   production implementation.
//! - `RetryingDispatcher` retries timeouts, connection failures and 502s up
//!   to a fixed ceiling and otherwise returns the transport error unchanged.
//! - `ErrorTranslator` maps status errors to caller-defined `DomainError`s
//!   on request; the client never translates on its own.
//! - `ResponseCache` persists named responses with a TTL.
//! - An optional observation hook sees every successful body and is guarded
//!   against re-entry and isolated from the caller's result.

pub mod cache;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod hook;
pub mod http;
pub mod pacing;
pub mod translate;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cache::{CacheEntry, ResponseCache};
pub use client::ApiClient;
pub use config::{ClientConfig, ConnectRetry, Credentials};
pub use dispatch::{RetryBudget, RetryingDispatcher};
pub use envelope::{EnvelopeNode, EnvelopeView, Field, ResponseEnvelope};
pub use error::{ApiError, DomainError, Retryable};
pub use hook::{in_hook_dispatch, HookError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, ResponseFormat};
pub use pacing::{PacedScheduler, PacingProfile, PacingSlot};
pub use translate::{translate_errors, ErrorTranslator};
pub use transport::{Transport, UreqTransport};
