//! Paced, bounded-retry dispatch on top of a `Transport`.
//!
//! # Design
//! One logical call waits for its pacing slot once, then tries the transport
//! up to `1 + retry_ceiling` times. Only transient failures (`Retryable`)
//! consume the budget; everything else returns after the first attempt.
//! When the budget runs out the last transport error is returned as-is.
//!
//! Retries reuse the slot taken by the first attempt, so they are not paced
//! against each other. Every attempt still refreshes the last-dispatch
//! timestamp, which pushes the next logical call's wait past the final retry.

use tracing::{debug, warn};

use crate::error::{ApiError, Retryable};
use crate::http::{HttpRequest, HttpResponse};
use crate::pacing::PacedScheduler;
use crate::transport::Transport;

/// Attempts left for one logical call after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    pub fn new(ceiling: u32) -> Self {
        Self { remaining: ceiling }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Spend one retry; `false` once the budget is exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Sends requests through a `Transport` with pacing and retries.
pub struct RetryingDispatcher<T> {
    transport: T,
    scheduler: PacedScheduler,
    retry_ceiling: u32,
}

impl<T: Transport> RetryingDispatcher<T> {
    pub fn new(transport: T, scheduler: PacedScheduler, retry_ceiling: u32) -> Self {
        Self {
            transport,
            scheduler,
            retry_ceiling,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scheduler(&self) -> &PacedScheduler {
        &self.scheduler
    }

    pub fn dispatch(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut slot = self.scheduler.wait_for(request.method.as_str());
        let mut budget = RetryBudget::new(self.retry_ceiling);
        let mut attempt = 1;

        loop {
            debug!(method = %request.method, path = ?request.path, attempt, "dispatching");
            let outcome = self.transport.send(request);
            slot.mark_dispatched();

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && budget.try_consume() => {
                    warn!(
                        method = %request.method,
                        path = ?request.path,
                        attempt,
                        remaining = budget.remaining(),
                        error = %err,
                        "transient failure, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
