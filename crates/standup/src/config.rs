//! Service configuration.
//!
//! Every struct here has a `Default` holding the reference values and
//! deserializes with `#[serde(default)]`, so a config file only needs the
//! fields it changes.

use serde::{Deserialize, Serialize};
use standup_credential::{MIN_ITERATIONS, PasswordPolicy, TokenConfig};
use standup_ratelimit::{ActionClass, RateLimitConfig};
use standup_store::StoreConfig;

use crate::StandupError;

/// Longest lifetime or window any setting may ask for: a leap year.
const MAX_TTL_SECS: u64 = 31_622_400;

/// Longest email token lifetime, in days.
const MAX_TOKEN_TTL_DAYS: i64 = 3_650;

/// Rules for sessions and who may join them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Participants allowed in one session, leader included.
    pub max_participants: usize,

    pub password: PasswordPolicy,

    /// PBKDF2 iterations for new password hashes. Clamped up to the
    /// minimum the hasher accepts.
    pub hash_iterations: u32,

    /// Longest transcript entry accepted, in characters.
    pub max_transcript_len: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_participants: 20,
            password: PasswordPolicy::default(),
            hash_iterations: MIN_ITERATIONS,
            max_transcript_len: 10_000,
        }
    }
}

/// Email verification settings. The code lifetime is
/// [`StoreConfig::verification_ttl_secs`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Wrong-email submissions a code survives before it's destroyed.
    pub max_attempts: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// All configuration for a [`StandupService`](crate::StandupService).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StandupConfig {
    pub session: SessionPolicy,
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    pub verification: VerificationConfig,
    pub tokens: TokenConfig,
}

impl StandupConfig {
    /// Rejects values the service can't run with, before anything adds
    /// them to a timestamp.
    ///
    /// # Errors
    /// [`StandupError::Internal`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), StandupError> {
        let secs_in_range = |secs: u64| (1..=MAX_TTL_SECS).contains(&secs);

        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&self.tokens.email_token_ttl_days) {
            return Err(invalid("tokens.email_token_ttl_days"));
        }
        if !u64::try_from(self.tokens.access_grant_ttl_secs).is_ok_and(secs_in_range) {
            return Err(invalid("tokens.access_grant_ttl_secs"));
        }
        if !secs_in_range(self.store.session_ttl_secs) {
            return Err(invalid("store.session_ttl_secs"));
        }
        if !secs_in_range(self.store.verification_ttl_secs) {
            return Err(invalid("store.verification_ttl_secs"));
        }
        if self.store.op_timeout_ms == 0 || self.store.op_timeout_ms / 1_000 > MAX_TTL_SECS {
            return Err(invalid("store.op_timeout_ms"));
        }
        if self.rate_limit.sweep_interval_secs > MAX_TTL_SECS {
            return Err(invalid("rate_limit.sweep_interval_secs"));
        }
        for action in ActionClass::ALL {
            if !secs_in_range(self.rate_limit.rule(action).window_secs) {
                return Err(StandupError::Internal(format!(
                    "invalid configuration: rate_limit window for {action} out of range"
                )));
            }
        }
        if self.session.max_participants == 0 {
            return Err(invalid("session.max_participants"));
        }
        if self.verification.max_attempts == 0 {
            return Err(invalid("verification.max_attempts"));
        }
        Ok(())
    }
}

fn invalid(setting: &str) -> StandupError {
    StandupError::Internal(format!("invalid configuration: {setting} out of range"))
}
