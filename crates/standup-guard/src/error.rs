//! Error types for the guard.

use standup_store::StoreError;

/// Errors that stop the guard from reaching a decision.
///
/// [`AccessGuard::check`](crate::AccessGuard::check) turns all of these
/// into [`GuardDecision::RetryLater`](crate::GuardDecision::RetryLater);
/// they only surface through
/// [`AccessGuard::evaluate`](crate::AccessGuard::evaluate).
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("session lookup failed: {0}")]
    Storage(#[from] StoreError),

    /// The client's local cache couldn't be read or written.
    #[error("local cache unavailable: {0}")]
    Cache(String),
}
