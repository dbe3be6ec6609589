//! A [`KeyValueStore`] wrapper that misbehaves on request.
//!
//! Only compiled for tests and under the `test-util` feature.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::{KeyValueStore, MemoryStore, StoreError, TtlUpdate};

/// Wraps another store and can be taken offline, slowed down, or made to
/// lose compare-and-swap races.
///
/// ```rust,ignore
/// let store = FaultyStore::new(MemoryStore::new());
/// store.set_offline(true);   // every call → StoreError::Unavailable
/// store.set_delay(Duration::from_secs(5)); // every call sleeps first
/// store.fail_next_swaps(3);  // next 3 compare_and_swap calls return false
/// ```
#[derive(Debug, Default)]
pub struct FaultyStore<S = MemoryStore> {
    inner: S,
    offline: AtomicBool,
    delay_ms: AtomicU64,
    failing_swaps: AtomicU32,
}

impl<S: KeyValueStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            failing_swaps: AtomicU32::new(0),
        }
    }

    /// The wrapped store, bypassing any injected faults.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes every call sleep for `delay` before doing anything.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes the next `count` compare-and-swap calls report a conflict.
    pub fn fail_next_swaps(&self, count: u32) {
        self.failing_swaps.store(count, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("backend offline".into()));
        }
        Ok(())
    }
}

impl<S: KeyValueStore> KeyValueStore for FaultyStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.gate().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.gate().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn insert_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.gate().await?;
        self.inner.insert_if_absent(key, value, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
        ttl: TtlUpdate,
    ) -> Result<bool, StoreError> {
        self.gate().await?;
        let forced = self
            .failing_swaps
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Ok(false);
        }
        self.inner.compare_and_swap(key, expected, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.gate().await?;
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.gate().await?;
        self.inner.delete(key).await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.gate().await?;
        self.inner.purge_expired().await
    }
}
