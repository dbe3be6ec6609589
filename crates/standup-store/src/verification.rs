//! Short-lived email verification codes.
//!
//! A code is never stored in the clear. The key is the SHA-256 of the
//! code, so a dump of the backend doesn't hand out working codes, and the
//! value records which email the code was sent to plus how many wrong
//! guesses it has absorbed.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use standup_protocol::{Codec, JsonCodec, VerificationRecord};
use tracing::debug;

use crate::kv::bounded;
use crate::{KeyValueStore, StoreConfig, StoreError, TtlUpdate};

pub const VERIFY_KEY_PREFIX: &str = "verify:";

/// The backend key for a code: `verify:{sha256_hex(code)}`.
pub fn code_key(code: &str) -> String {
    format!("{VERIFY_KEY_PREFIX}{}", hex::encode(Sha256::digest(code.as_bytes())))
}

/// Verification records on top of a [`KeyValueStore`].
pub struct VerificationCodeStore<S: KeyValueStore> {
    backend: Arc<S>,
    codec: JsonCodec,
    config: StoreConfig,
}

impl<S: KeyValueStore> VerificationCodeStore<S> {
    pub fn new(backend: Arc<S>, config: StoreConfig) -> Self {
        Self {
            backend,
            codec: JsonCodec,
            config,
        }
    }

    /// Records that `code` was sent to `email`.
    ///
    /// Returns `false` if a live record already exists under this code's
    /// hash. The caller should generate another code; overwriting would
    /// hijack someone else's pending verification.
    pub async fn put(&self, code: &str, email: &str, ttl: Duration) -> Result<bool, StoreError> {
        let bytes = self.codec.encode(&VerificationRecord::new(email.to_owned()))?;
        bounded(
            self.config.op_timeout(),
            "verify.put",
            self.backend.insert_if_absent(&code_key(code), bytes, ttl),
        )
        .await
    }

    pub async fn get(&self, code: &str) -> Result<Option<VerificationRecord>, StoreError> {
        let bytes = bounded(
            self.config.op_timeout(),
            "verify.get",
            self.backend.get(&code_key(code)),
        )
        .await?;
        match bytes {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Bumps the failed-attempt counter and returns the new count, or
    /// `None` if the code is gone. The record keeps its original expiry.
    pub async fn record_failed_attempt(&self, code: &str) -> Result<Option<u32>, StoreError> {
        let key = code_key(code);
        let limit = self.config.op_timeout();
        let attempts = self.config.cas_retries.max(1);

        for attempt in 1..=attempts {
            let Some(current) = bounded(limit, "verify.get", self.backend.get(&key)).await? else {
                return Ok(None);
            };
            let mut record: VerificationRecord = self.codec.decode(&current)?;
            record.attempts = record.attempts.saturating_add(1);
            let bytes = self.codec.encode(&record)?;

            let swapped = bounded(
                limit,
                "verify.compare_and_swap",
                self.backend
                    .compare_and_swap(&key, &current, bytes, TtlUpdate::Keep),
            )
            .await?;
            if swapped {
                return Ok(Some(record.attempts));
            }
            debug!(attempt, "verification record changed underneath update, retrying");
        }

        Err(StoreError::Conflict { key, attempts })
    }

    /// Deletes the record for `code`. Returns `false` if it was already
    /// consumed or expired, so of two racing consumers only one wins.
    pub async fn consume(&self, code: &str) -> Result<bool, StoreError> {
        bounded(
            self.config.op_timeout(),
            "verify.consume",
            self.backend.delete(&code_key(code)),
        )
        .await
    }
}
