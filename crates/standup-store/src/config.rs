//! Store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to a session's deadline when it's updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// The session expires `session_ttl` after creation, however busy it is.
    #[default]
    Absolute,
    /// Every update pushes expiry to `session_ttl` from the update time.
    Sliding,
}

/// Configuration for [`SessionStore`](crate::SessionStore) and
/// [`VerificationCodeStore`](crate::VerificationCodeStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Lifetime of a session record, in seconds.
    pub session_ttl_secs: u64,

    /// Lifetime of an unused verification code, in seconds.
    pub verification_ttl_secs: u64,

    /// Upper bound on any single backend round trip, in milliseconds.
    pub op_timeout_ms: u64,

    /// How many times a conditional update is attempted before giving up
    /// with [`StoreError::Conflict`](crate::StoreError::Conflict).
    pub cas_retries: u32,

    pub expiry_policy: ExpiryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 14_400,
            verification_ttl_secs: 300,
            op_timeout_ms: 2_000,
            cas_retries: 8,
            expiry_policy: ExpiryPolicy::Absolute,
        }
    }
}

impl StoreConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn verification_ttl(&self) -> Duration {
        Duration::from_secs(self.verification_ttl_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}
