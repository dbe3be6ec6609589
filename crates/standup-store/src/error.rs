//! Error types for the persistence layer.

use std::time::Duration;

use standup_protocol::ProtocolError;

/// Errors returned by the stores.
///
/// None of these mean "not found": a missing or expired record is
/// `Ok(None)`. Every variant here means the caller can't know the state of
/// the backend and should retry later.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend didn't answer within the configured bound.
    #[error("store operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend couldn't be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A conditional update kept losing to concurrent writers.
    #[error("write conflict on {key} after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    /// A stored value couldn't be encoded or decoded.
    #[error("stored value is malformed: {0}")]
    Codec(#[from] ProtocolError),
}
