//! Observation hook fired after successful dispatches.
//!
//! # Design
//! At most one hook is registered per client. While it runs, a thread-local
//! scope marks the thread as "inside hook dispatch": nested calls made by the
//! hook do not fire it again, and `ResponseCache` serves stale entries
//! instead of refreshing them. The scope is reset by `Drop`, so an erroring
//! or panicking hook cannot leave it set.
//!
//! The scope belongs to the thread, not to a client. If one client's hook
//! calls a second client on the same thread, the second client's hook is
//! suppressed for that nested call too, and its cache serves stale entries.
//! Hooks on other threads are unaffected.
//!
//! Hook failures are logged and swallowed; the call that triggered the hook
//! always returns its own result.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ApiClient;

/// Error type a hook may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked with the client and the full parsed response body.
pub type Hook<T> = dyn Fn(&ApiClient<T>, &Value) -> Result<(), HookError> + Send + Sync;

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is running a hook.
pub fn in_hook_dispatch() -> bool {
    IN_HOOK.with(Cell::get)
}

/// Marks the current thread as inside hook dispatch until dropped.
struct HookScope(());

impl HookScope {
    fn enter() -> Option<Self> {
        if in_hook_dispatch() {
            return None;
        }
        IN_HOOK.with(|flag| flag.set(true));
        Some(HookScope(()))
    }
}

impl Drop for HookScope {
    fn drop(&mut self) {
        IN_HOOK.with(|flag| flag.set(false));
    }
}

#[cfg(test)]
pub(crate) fn inside_hook_scope<R>(f: impl FnOnce() -> R) -> R {
    let _scope = HookScope::enter();
    f()
}

/// The single hook registration of a client.
pub(crate) struct HookSlot<T> {
    hook: RwLock<Option<Arc<Hook<T>>>>,
}

impl<T> HookSlot<T> {
    pub(crate) fn new() -> Self {
        Self { hook: RwLock::new(None) }
    }

    pub(crate) fn set(&self, hook: Arc<Hook<T>>) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub(crate) fn clear(&self) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn is_set(&self) -> bool {
        self.hook.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Run the hook once for `body`, unless none is set or this thread is
    /// already inside it.
    pub(crate) fn fire(&self, client: &ApiClient<T>, body: &Value) {
        // Clone out of the lock so the hook may replace itself.
        let Some(hook) = self.hook.read().unwrap_or_else(PoisonError::into_inner).clone() else {
            return;
        };
        let Some(_scope) = HookScope::enter() else {
            debug!("already inside hook dispatch, not firing again");
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| hook(client, body))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "response hook failed"),
            Err(_) => warn!("response hook panicked"),
        }
    }
}
