//! The byte-level key-value contract and its in-process implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::StoreError;

/// What a successful [`KeyValueStore::compare_and_swap`] does to the key's
/// expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUpdate {
    /// Expire `Duration` from now.
    Reset(Duration),
    /// Leave the current deadline alone.
    Keep,
}

/// A TTL-capable key-value backend.
///
/// Values are opaque bytes; encoding is the caller's business. An expired
/// key must behave exactly like one that was never written: `get` returns
/// `None`, `exists` returns `false`, and `insert_if_absent` succeeds.
///
/// Every method can fail with [`StoreError::Unavailable`]. Callers must
/// not assume a write landed unless it returned `Ok`.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Writes `value` unconditionally, replacing any previous value and
    /// deadline.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Writes `value` only if `key` holds nothing live. Returns `false`
    /// (and writes nothing) if it does.
    fn insert_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Replaces the value only if it is still exactly `expected`. Returns
    /// `false` if the key changed, expired or vanished in the meantime.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
        ttl: TtlUpdate,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes `key` now. Returns `true` if something live was removed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Drops every expired key. Backends with native expiry can return
    /// `Ok(0)`.
    fn purge_expired(&self) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

/// Runs one backend call under `limit`.
///
/// Elapsed time becomes [`StoreError::Timeout`]. Every failure is logged at
/// `warn` with the operation name, never with the value.
pub(crate) async fn bounded<T>(
    limit: Duration,
    op: &'static str,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(op, error = %e, "store operation failed");
            Err(e)
        }
        Err(_) => {
            warn!(op, timeout_ms = limit.as_millis() as u64, "store operation timed out");
            Err(StoreError::Timeout(limit))
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A [`KeyValueStore`] held in process memory.
///
/// Cloning is cheap and clones share the same map, so one `MemoryStore`
/// can back a session store and a verification store at once. Expired
/// entries are invisible immediately and removed lazily, or in bulk by
/// [`purge_expired`](KeyValueStore::purge_expired).
///
/// Deadlines use `tokio::time::Instant`, so a paused test clock drives
/// expiry.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Every write is a single map operation, so a poisoned map is intact.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the live entry for `key`, dropping it if it has expired.
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.lock();
        Ok(Self::live(&mut entries, key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + ttl;
        self.lock()
            .insert(key.to_owned(), Entry { value, expires_at });
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock();
        if Self::live(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
        ttl: TtlUpdate,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let Some(entry) = Self::live(&mut entries, key, now) else {
            return Ok(false);
        };
        if entry.value != expected {
            return Ok(false);
        }
        entry.value = value;
        if let TtlUpdate::Reset(ttl) = ttl {
            entry.expires_at = now + ttl;
        }
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        Ok(Self::live(&mut entries, key, Instant::now()).is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .lock()
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }
}
