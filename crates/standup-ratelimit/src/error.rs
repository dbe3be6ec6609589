//! Error types for the rate limiting layer.

use std::time::Duration;

use crate::ActionClass;

/// Errors returned by the rate limiter.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The quota for this identifier and action is used up. The caller may
    /// try again once `retry_after` has passed.
    #[error("rate limit exceeded for {action}, retry in {}s", retry_after.as_secs())]
    Limited {
        action: ActionClass,
        retry_after: Duration,
    },

    /// The counter store couldn't be reached. Only distributed stores
    /// produce this; the in-memory store never fails.
    #[error("rate limit store unavailable: {0}")]
    Backend(String),
}
