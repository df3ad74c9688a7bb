//! File-backed response cache keyed by caller-chosen names.
//!
//! # Design
//! Each cache name maps to one JSON file holding the payload and the time it
//! was written. Refreshes replace the file wholesale: the new entry is
//! written to a uniquely named sibling and renamed over the old one, so a
//! reader sees either the previous entry or the new one. Concurrent
//! refreshes of the same name are not coordinated; the last rename wins.
//!
//! While the current thread is inside hook dispatch, expired entries are
//! served as if fresh so a hook that reads cached data cannot set off a
//! chain of refreshes. Missing entries are still fetched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::envelope::ResponseEnvelope;
use crate::error::ApiError;
use crate::hook::in_hook_dispatch;

/// One persisted response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub written_at_ms: u64,
    pub payload: Value,
}

impl CacheEntry {
    fn new(payload: Value) -> Self {
        Self {
            written_at_ms: now_ms(),
            payload,
        }
    }

    pub fn age(&self) -> Duration {
        Duration::from_millis(now_ms().saturating_sub(self.written_at_ms))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Time-limited cache of response payloads.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { dir: dir.into(), ttl }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the entry stored under `name`, calling `fetch` and storing its
    /// result when the entry is missing or older than the TTL.
    pub fn get_or_fetch<F>(&self, name: &str, fetch: F) -> Result<ResponseEnvelope, ApiError>
    where
        F: FnOnce() -> Result<ResponseEnvelope, ApiError>,
    {
        let path = self.path_for(name)?;
        if let Some(entry) = self.load(name, &path) {
            let age = entry.age();
            if age < self.ttl {
                debug!(cache = name, age_secs = age.as_secs(), "cache hit");
                return Ok(ResponseEnvelope::new(entry.payload));
            }
            if in_hook_dispatch() {
                debug!(cache = name, age_secs = age.as_secs(), "serving expired entry inside hook");
                return Ok(ResponseEnvelope::new(entry.payload));
            }
        }

        info!(cache = name, "refreshing cache entry");
        let envelope = fetch()?;
        self.store(name, &path, &CacheEntry::new(envelope.value().clone()))?;
        Ok(envelope)
    }

    /// Read the entry under `name` without regard to its age.
    pub fn peek(&self, name: &str) -> Result<Option<CacheEntry>, ApiError> {
        let path = self.path_for(name)?;
        Ok(self.load(name, &path))
    }

    /// Drop the entry under `name`, if any.
    pub fn invalidate(&self, name: &str) -> Result<(), ApiError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(cache_error(name, source)),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, ApiError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ApiError::InvalidRequest(format!("invalid cache name `{name}`")));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    fn load(&self, name: &str, path: &Path) -> Option<CacheEntry> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(cache = name, error = %e, "unreadable cache entry, refetching");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(cache = name, error = %e, "corrupt cache entry, refetching");
                None
            }
        }
    }

    fn store(&self, name: &str, path: &Path, entry: &CacheEntry) -> Result<(), ApiError> {
        fs::create_dir_all(&self.dir).map_err(|e| cache_error(name, e))?;
        let bytes = serde_json::to_vec(entry).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let staging = self.dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()));
        fs::write(&staging, bytes).map_err(|e| cache_error(name, e))?;
        fs::rename(&staging, path).map_err(|e| {
            let _ = fs::remove_file(&staging);
            cache_error(name, e)
        })
    }
}

fn cache_error(name: &str, source: io::Error) -> ApiError {
    ApiError::CacheError {
        name: name.to_string(),
        source,
    }
}
