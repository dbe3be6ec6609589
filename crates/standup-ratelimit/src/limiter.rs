//! The rate limiter callers talk to.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    ActionClass, MemoryRateLimitStore, RateDecision, RateKey, RateLimitConfig, RateLimitError,
    RateLimitStore,
};

/// Applies [`RateLimitConfig`] quotas using a [`RateLimitStore`].
///
/// ```text
/// check_and_increment("203.0.113.7", SessionCreate)
///     → Ok(decision)            quota left, counted
///     → Err(Limited{retry_after}) quota used up, nothing counted
/// ```
pub struct RateLimiter<S: RateLimitStore = MemoryRateLimitStore> {
    store: S,
    config: RateLimitConfig,
}

impl RateLimiter<MemoryRateLimitStore> {
    /// A limiter backed by a fresh in-process store.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(MemoryRateLimitStore::new(), config)
    }
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(store: S, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Returns the quotas in force.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Counts one `action` by `identifier` if quota remains.
    ///
    /// # Errors
    /// - [`RateLimitError::Limited`] when the quota is used up; the entry
    ///   is not modified
    /// - [`RateLimitError::Backend`] if the store fails
    pub async fn check_and_increment(
        &self,
        identifier: &str,
        action: ActionClass,
    ) -> Result<RateDecision, RateLimitError> {
        let rule = self.config.rule(action);
        let now = Instant::now();
        let decision = self
            .store
            .check_and_increment(&RateKey::new(identifier, action), rule, now)
            .await?;

        if !decision.allowed {
            let retry_after = decision.reset_at.saturating_duration_since(now);
            debug!(
                %action,
                limit = decision.limit,
                retry_after_secs = retry_after.as_secs(),
                "rate limit exceeded"
            );
            return Err(RateLimitError::Limited {
                action,
                retry_after,
            });
        }
        Ok(decision)
    }

    /// Requests still allowed for `identifier` in the current window.
    /// Pure read.
    pub async fn remaining(
        &self,
        identifier: &str,
        action: ActionClass,
    ) -> Result<u32, RateLimitError> {
        let rule = self.config.rule(action);
        let entry = self.store.peek(&RateKey::new(identifier, action)).await?;
        Ok(match entry {
            Some(entry) if !entry.is_elapsed(Instant::now()) => {
                rule.max_requests.saturating_sub(entry.count)
            }
            _ => rule.max_requests,
        })
    }

    /// When the current window for `identifier` ends, or `None` if no
    /// window is open. Pure read.
    pub async fn reset_at(
        &self,
        identifier: &str,
        action: ActionClass,
    ) -> Result<Option<Instant>, RateLimitError> {
        let entry = self.store.peek(&RateKey::new(identifier, action)).await?;
        Ok(entry
            .filter(|entry| !entry.is_elapsed(Instant::now()))
            .map(|entry| entry.window_end))
    }

    /// Time until `identifier` regains quota for `action`; zero if it has
    /// quota now.
    pub async fn retry_after(
        &self,
        identifier: &str,
        action: ActionClass,
    ) -> Result<Duration, RateLimitError> {
        if self.remaining(identifier, action).await? > 0 {
            return Ok(Duration::ZERO);
        }
        Ok(self
            .reset_at(identifier, action)
            .await?
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO))
    }

    /// Drops counters whose window has ended.
    pub async fn sweep(&self) -> Result<usize, RateLimitError> {
        match self.store.sweep(Instant::now()).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "swept stale rate limit entries");
                }
                Ok(removed)
            }
            Err(e) => {
                warn!(error = %e, "rate limit sweep failed");
                Err(e)
            }
        }
    }
}
