//! Counter storage for the rate limiter.
//!
//! The limiter never owns a global map. It's handed a [`RateLimitStore`],
//! so a single process can use [`MemoryRateLimitStore`] while a fleet of
//! instances plugs in a store backed by one shared atomic counter.
//!
//! # Atomicity
//!
//! `check_and_increment` must be atomic per key: two concurrent calls for
//! the same key must never both read the same stale `count`. The memory
//! store gets this by doing the whole read-check-write under one mutex
//! acquisition.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::time::Instant;

use crate::{ActionClass, RateLimitError, RateLimitRule};

/// Identifies one quota: who is acting, and what they're doing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub identifier: String,
    pub action: ActionClass,
}

impl RateKey {
    pub fn new(identifier: impl Into<String>, action: ActionClass) -> Self {
        Self {
            identifier: identifier.into(),
            action,
        }
    }
}

/// Requests counted so far in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_end: Instant,
}

impl RateLimitEntry {
    /// Returns `true` once the window has ended.
    pub fn is_elapsed(&self, now: Instant) -> bool {
        self.window_end < now
    }
}

/// The outcome of a `check_and_increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Count after this call (unchanged when denied).
    pub count: u32,
    pub limit: u32,
    /// When the current window ends and a fresh quota begins.
    pub reset_at: Instant,
}

impl RateDecision {
    /// Requests still available in the current window.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

/// Where rate limit counters live.
///
/// Implementations must make [`check_and_increment`](Self::check_and_increment)
/// atomic per key. Reads ([`peek`](Self::peek)) must never mutate.
pub trait RateLimitStore: Send + Sync + 'static {
    /// Applies one request against `key` under `rule`:
    ///
    /// 1. no entry, or the window has ended → reset to `count = 0`,
    ///    `window_end = now + window`
    /// 2. `count >= max_requests` → deny, leaving the entry untouched
    /// 3. otherwise → increment and allow
    fn check_and_increment(
        &self,
        key: &RateKey,
        rule: RateLimitRule,
        now: Instant,
    ) -> impl Future<Output = Result<RateDecision, RateLimitError>> + Send;

    /// Returns the entry for `key`, if one exists. Pure read.
    fn peek(
        &self,
        key: &RateKey,
    ) -> impl Future<Output = Result<Option<RateLimitEntry>, RateLimitError>> + Send;

    /// Removes every entry whose window ended before `now`. Returns how
    /// many were removed.
    fn sweep(&self, now: Instant) -> impl Future<Output = Result<usize, RateLimitError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryRateLimitStore
// ---------------------------------------------------------------------------

/// A [`RateLimitStore`] for a single process.
///
/// Uses a `std::sync::Mutex`: every critical section is a handful of
/// hash map operations with no `.await` inside, so an async mutex would
/// only add overhead.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<RateKey, RateLimitEntry>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked keys, stale or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A panic while holding the lock can't leave a half-written entry
    /// (every write is a single insert), so a poisoned map is still valid.
    fn lock(&self) -> MutexGuard<'_, HashMap<RateKey, RateLimitEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &RateKey,
        rule: RateLimitRule,
        now: Instant,
    ) -> Result<RateDecision, RateLimitError> {
        let mut entries = self.lock();

        let entry = entries.entry(key.clone()).or_insert(RateLimitEntry {
            count: 0,
            window_end: now + rule.window(),
        });
        if entry.is_elapsed(now) {
            *entry = RateLimitEntry {
                count: 0,
                window_end: now + rule.window(),
            };
        }

        if entry.count >= rule.max_requests {
            return Ok(RateDecision {
                allowed: false,
                count: entry.count,
                limit: rule.max_requests,
                reset_at: entry.window_end,
            });
        }

        entry.count += 1;
        Ok(RateDecision {
            allowed: true,
            count: entry.count,
            limit: rule.max_requests,
            reset_at: entry.window_end,
        })
    }

    async fn peek(&self, key: &RateKey) -> Result<Option<RateLimitEntry>, RateLimitError> {
        Ok(self.lock().get(key).copied())
    }

    async fn sweep(&self, now: Instant) -> Result<usize, RateLimitError> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_elapsed(now));
        Ok(before - entries.len())
    }
}
