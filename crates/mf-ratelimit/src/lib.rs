// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-`rateKey` admission control shared across the runner (§5).
//!
//! Jobs that share a [`JobDescriptor::rate_key`](mf_core::JobDescriptor::rate_key)
//! contend for the same limiter. Concurrency defaults to 1 per key (the
//! provider-bounded case) and may be overridden per key via
//! [`RateLimiter::with_override`].
//!
//! Cancellation is deliberately not wired into this crate: the runner races
//! [`RateLimiter::acquire`] against its own cancellation token with
//! `tokio::select!`, so a rate-limiter wait is abandoned the instant the run
//! is cancelled without this crate needing to know what a "run" is (§5
//! Suspension/blocking points).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Default per-key concurrency when no override is configured: one in-flight
/// job at a time, matching provider-bounded rate keys (§5).
pub const DEFAULT_CONCURRENCY: usize = 1;

/// A held admission slot for one rate key. Dropping the guard releases the
/// slot back to the limiter.
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

struct Inner {
    default_concurrency: usize,
    overrides: HashMap<String, usize>,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Shared, cloneable admission controller keyed by rate key (`<provider>:<model>`
/// by default, §4.3 step 5).
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

/// Builds a [`RateLimiter`] with per-key concurrency overrides (§4.3 step 5).
pub struct RateLimiterBuilder {
    default_concurrency: usize,
    overrides: HashMap<String, usize>,
}

impl RateLimiterBuilder {
    /// Override the concurrency for a specific rate key, e.g. a catalog
    /// entry that permits more than one in-flight call for a given
    /// provider+model.
    #[must_use]
    pub fn with_override(mut self, rate_key: impl Into<String>, concurrency: usize) -> Self {
        self.overrides.insert(rate_key.into(), concurrency.max(1));
        self
    }

    /// Finish building the limiter.
    #[must_use]
    pub fn build(self) -> RateLimiter {
        RateLimiter {
            inner: Arc::new(Inner {
                default_concurrency: self.default_concurrency,
                overrides: self.overrides,
                semaphores: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl RateLimiter {
    /// Create a limiter with the given default per-key concurrency.
    #[must_use]
    pub fn new(default_concurrency: usize) -> Self {
        Self::builder(default_concurrency).build()
    }

    /// Create a limiter using [`DEFAULT_CONCURRENCY`] for every key.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }

    /// Start building a limiter with per-key overrides (§4.3 step 5).
    #[must_use]
    pub fn builder(default_concurrency: usize) -> RateLimiterBuilder {
        RateLimiterBuilder {
            default_concurrency: default_concurrency.max(1),
            overrides: HashMap::new(),
        }
    }

    fn concurrency_for(&self, rate_key: &str) -> usize {
        self.inner
            .overrides
            .get(rate_key)
            .copied()
            .unwrap_or(self.inner.default_concurrency)
    }

    async fn semaphore_for(&self, rate_key: &str) -> Arc<Semaphore> {
        let mut guard = self.inner.semaphores.lock().await;
        guard
            .entry(rate_key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.concurrency_for(rate_key))))
            .clone()
    }

    /// Acquire one admission slot for `rate_key`, waiting if the key is
    /// already at its concurrency limit.
    ///
    /// # Panics
    ///
    /// Never panics under normal operation; the underlying semaphore is
    /// never closed by this crate.
    pub async fn acquire(&self, rate_key: &str) -> RatePermit {
        let sem = self.semaphore_for(rate_key).await;
        trace!(target: "mf_ratelimit", rate_key, "awaiting admission slot");
        let permit = sem
            .acquire_owned()
            .await
            .expect("rate limiter semaphore is never closed");
        RatePermit { _permit: permit }
    }

}
