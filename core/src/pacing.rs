//! Client-side request pacing.
//!
//! # Design
//! The remote service expects every client installation to space out its
//! own requests. `PacedScheduler` owns the single "last dispatch" timestamp
//! for one client; `wait_for` sleeps until the interval for the verb has
//! elapsed and hands back a `PacingSlot` that holds the timestamp lock for
//! the whole logical call. Concurrent callers on the same client therefore
//! queue behind each other instead of both reading a stale timestamp.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

/// Minimum spacing between dispatches, with optional per-verb overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PacingProfileFile")]
pub struct PacingProfile {
    default: Duration,
    overrides: HashMap<String, Duration>,
}

impl PacingProfile {
    /// Same interval for every verb.
    pub fn flat(interval: Duration) -> Self {
        Self {
            default: interval,
            overrides: HashMap::new(),
        }
    }

    /// Conservative profile for unattended use: writes every 10 s, reads every 3 s.
    pub fn batch() -> Self {
        Self::flat(Duration::from_secs(10)).with_override("GET", Duration::from_secs(3))
    }

    /// Fast profile for interactive use.
    pub fn interactive() -> Self {
        Self::flat(Duration::from_millis(500))
    }

    pub fn with_override(mut self, method: &str, interval: Duration) -> Self {
        self.overrides.insert(method.to_ascii_lowercase(), interval);
        self
    }

    pub fn default_interval(&self) -> Duration {
        self.default
    }

    /// Interval for `method`, matched case-insensitively; unknown verbs get
    /// the default.
    pub fn interval_for(&self, method: &str) -> Duration {
        self.overrides
            .get(&method.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default)
    }
}

impl Default for PacingProfile {
    fn default() -> Self {
        Self::batch()
    }
}

/// On-disk form of a `PacingProfile`, in seconds.
#[derive(Deserialize)]
struct PacingProfileFile {
    default_secs: f64,
    #[serde(default)]
    overrides: HashMap<String, f64>,
}

impl TryFrom<PacingProfileFile> for PacingProfile {
    type Error = String;

    fn try_from(file: PacingProfileFile) -> Result<Self, Self::Error> {
        let seconds = |label: &str, secs: f64| {
            Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid interval for {label}: {secs} ({e})"))
        };
        let mut profile = Self::flat(seconds("default", file.default_secs)?);
        for (method, secs) in file.overrides {
            let interval = seconds(&method, secs)?;
            profile = profile.with_override(&method, interval);
        }
        Ok(profile)
    }
}

/// Enforces the minimum gap between dispatches for one client.
#[derive(Debug)]
pub struct PacedScheduler {
    profile: PacingProfile,
    last_dispatch: Mutex<Option<Instant>>,
}

impl PacedScheduler {
    pub fn new(profile: PacingProfile) -> Self {
        Self {
            profile,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn profile(&self) -> &PacingProfile {
        &self.profile
    }

    /// Block until `method` may be dispatched. The first call on a fresh
    /// scheduler never waits.
    pub fn wait_for(&self, method: &str) -> PacingSlot<'_> {
        let last_dispatch = self.last_dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let interval = self.profile.interval_for(method);
        if let Some(last) = *last_dispatch {
            let elapsed = last.elapsed();
            if elapsed < interval {
                let pause = interval - elapsed;
                debug!(method, pause_ms = pause.as_millis() as u64, "pacing request");
                thread::sleep(pause);
            }
        }
        PacingSlot { last_dispatch }
    }

    /// Time of the last recorded dispatch, if any.
    pub fn last_dispatch(&self) -> Option<Instant> {
        *self.last_dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to the scheduler's timestamp for one logical call.
#[derive(Debug)]
pub struct PacingSlot<'a> {
    last_dispatch: MutexGuard<'a, Option<Instant>>,
}

impl PacingSlot<'_> {
    /// Record "now" as the time of the last dispatch.
    pub fn mark_dispatched(&mut self) {
        *self.last_dispatch = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TICK: Duration = Duration::from_millis(60);

    #[test]
    fn override_lookup_is_case_insensitive() {
        let profile = PacingProfile::flat(Duration::from_secs(1)).with_override("get", Duration::from_secs(3));
        assert_eq!(profile.interval_for("GET"), Duration::from_secs(3));
        assert_eq!(profile.interval_for("Get"), Duration::from_secs(3));
        assert_eq!(profile.interval_for("POST"), Duration::from_secs(1));
        assert_eq!(profile.interval_for("PATCH"), Duration::from_secs(1));
    }

    #[test]
    fn presets_match_their_intended_use() {
        let batch = PacingProfile::batch();
        assert_eq!(batch.interval_for("GET"), Duration::from_secs(3));
        assert_eq!(batch.interval_for("POST"), Duration::from_secs(10));
        assert_eq!(batch.interval_for("DELETE"), Duration::from_secs(10));
        assert_eq!(batch.default_interval(), Duration::from_secs(10));

        let interactive = PacingProfile::interactive();
        assert_eq!(interactive.interval_for("GET"), Duration::from_millis(500));
        assert_eq!(interactive.interval_for("PUT"), Duration::from_millis(500));
    }

    #[test]
    fn profile_deserializes_from_seconds() {
        let profile: PacingProfile =
            serde_json::from_str(r#"{"default_secs": 1.5, "overrides": {"POST": 10}}"#).unwrap();
        assert_eq!(profile.interval_for("get"), Duration::from_millis(1500));
        assert_eq!(profile.interval_for("post"), Duration::from_secs(10));
    }

    #[test]
    fn negative_interval_is_rejected() {
        let result: Result<PacingProfile, _> = serde_json::from_str(r#"{"default_secs": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn first_dispatch_does_not_wait() {
        let scheduler = PacedScheduler::new(PacingProfile::flat(Duration::from_secs(60)));
        let start = Instant::now();
        let mut slot = scheduler.wait_for("GET");
        slot.mark_dispatched();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn consecutive_dispatches_are_spaced_by_interval() {
        let scheduler = PacedScheduler::new(PacingProfile::flat(TICK));
        scheduler.wait_for("GET").mark_dispatched();
        let start = Instant::now();
        scheduler.wait_for("GET").mark_dispatched();
        assert!(start.elapsed() >= TICK - Duration::from_millis(5));
    }

    #[test]
    fn interval_of_next_verb_applies_regardless_of_previous_verb() {
        let profile = PacingProfile::flat(Duration::from_millis(10)).with_override("POST", TICK * 2);
        let scheduler = PacedScheduler::new(profile);
        scheduler.wait_for("GET").mark_dispatched();
        let start = Instant::now();
        scheduler.wait_for("POST").mark_dispatched();
        assert!(start.elapsed() >= TICK * 2 - Duration::from_millis(5));
    }

    #[test]
    fn waiting_without_marking_leaves_timestamp_untouched() {
        let scheduler = PacedScheduler::new(PacingProfile::flat(TICK));
        drop(scheduler.wait_for("GET"));
        assert!(scheduler.last_dispatch().is_none());
    }

    #[test]
    fn concurrent_callers_do_not_share_a_stale_timestamp() {
        let scheduler = Arc::new(PacedScheduler::new(PacingProfile::flat(TICK)));
        scheduler.wait_for("GET").mark_dispatched();

        let start = Instant::now();
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || scheduler.wait_for("GET").mark_dispatched())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(start.elapsed() >= TICK * 2 - Duration::from_millis(10));
    }
}
