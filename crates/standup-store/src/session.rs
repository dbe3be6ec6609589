//! Typed access to session records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use standup_protocol::{Codec, JsonCodec, Participant, SessionId, SessionRecord, TranscriptEntry};
use tracing::{debug, info};

use crate::kv::bounded;
use crate::{ExpiryPolicy, KeyValueStore, StoreConfig, StoreError, TtlUpdate};

pub const SESSION_KEY_PREFIX: &str = "session:";

/// The backend key for a session.
pub fn session_key(id: &SessionId) -> String {
    format!("{SESSION_KEY_PREFIX}{id}")
}

/// A partial update to a [`SessionRecord`].
///
/// `None` leaves a field alone. There is no way to express a change to
/// `id` or `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub leader_name: Option<String>,
    /// `Some(None)` removes the password.
    pub password_hash: Option<Option<String>>,
    pub participants: Option<Vec<Participant>>,
    pub transcripts: Option<Vec<TranscriptEntry>>,
    pub summary: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// Writes every `Some` field into `record`.
    pub fn apply(self, record: &mut SessionRecord) {
        if let Some(name) = self.leader_name {
            record.leader_name = name;
        }
        if let Some(hash) = self.password_hash {
            record.password_hash = hash;
        }
        if let Some(participants) = self.participants {
            record.participants = participants;
        }
        if let Some(transcripts) = self.transcripts {
            record.transcripts = Some(transcripts);
        }
        if let Some(summary) = self.summary {
            record.summary = Some(summary);
        }
        if let Some(finished_at) = self.finished_at {
            record.finished_at = Some(finished_at);
        }
    }
}

/// Session records on top of a [`KeyValueStore`].
///
/// ## Guarantees
///
/// - `id` and `created_at` never change after [`set`](Self::set), whatever
///   an update asks for.
/// - Updates are conditional: a concurrent writer makes this one retry
///   against the fresh record instead of overwriting it.
/// - Every backend round trip is bounded by `op_timeout`; slow or
///   unreachable backends surface as [`StoreError`], never as a hang.
/// - An expired session and a deleted one look the same: `Ok(None)`.
pub struct SessionStore<S: KeyValueStore> {
    backend: Arc<S>,
    codec: JsonCodec,
    config: StoreConfig,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(backend: Arc<S>, config: StoreConfig) -> Self {
        Self {
            backend,
            codec: JsonCodec,
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<S> {
        &self.backend
    }

    /// Writes `record` unconditionally, expiring `ttl` from now.
    pub async fn set(&self, record: &SessionRecord, ttl: Duration) -> Result<(), StoreError> {
        let bytes = self.codec.encode(record)?;
        bounded(
            self.config.op_timeout(),
            "session.set",
            self.backend.set(&session_key(&record.id), bytes, ttl),
        )
        .await
    }

    /// Fetches a live session.
    pub async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let bytes = bounded(
            self.config.op_timeout(),
            "session.get",
            self.backend.get(&session_key(id)),
        )
        .await?;
        match bytes {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Checks for a live session without decoding it.
    pub async fn exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        bounded(
            self.config.op_timeout(),
            "session.exists",
            self.backend.exists(&session_key(id)),
        )
        .await
    }

    /// Removes a session now. Returns `true` if it was live.
    pub async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        let removed = bounded(
            self.config.op_timeout(),
            "session.delete",
            self.backend.delete(&session_key(id)),
        )
        .await?;
        if removed {
            info!(session_id = %id, "session deleted");
        }
        Ok(removed)
    }

    /// Merges `patch` into the stored session and returns the result, or
    /// `None` if the session is gone.
    pub async fn update(
        &self,
        id: &SessionId,
        patch: SessionPatch,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let written = self
            .modify_record(id, |record| {
                patch.clone().apply(record);
                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(written.map(|((), record)| record))
    }

    /// Applies `change` to the stored session with compare-and-swap.
    ///
    /// ```text
    /// loop (up to cas_retries):
    ///     bytes  = get(key)            → None: return Ok(None)
    ///     record = decode(bytes)
    ///     out    = change(&mut record) → Err: return it, nothing written
    ///     pin id + created_at
    ///     compare_and_swap(key, bytes, encode(record))
    ///         true  → return Ok(Some(out))
    ///         false → someone else wrote first; go again
    /// ```
    ///
    /// `change` may run several times and must not have side effects
    /// outside `record`. If it leaves the record untouched nothing is
    /// written.
    ///
    /// # Errors
    /// Whatever `change` returns, or a [`StoreError`] converted into `E`.
    /// [`StoreError::Conflict`] if every attempt lost its race.
    pub async fn modify<T, E, F>(&self, id: &SessionId, change: F) -> Result<Option<T>, E>
    where
        F: FnMut(&mut SessionRecord) -> Result<T, E> + Send,
        T: Send,
        E: From<StoreError> + Send,
    {
        Ok(self.modify_record(id, change).await?.map(|(out, _)| out))
    }

    /// [`modify`](Self::modify), also returning the record as stored.
    async fn modify_record<T, E, F>(
        &self,
        id: &SessionId,
        mut change: F,
    ) -> Result<Option<(T, SessionRecord)>, E>
    where
        F: FnMut(&mut SessionRecord) -> Result<T, E> + Send,
        T: Send,
        E: From<StoreError> + Send,
    {
        let key = session_key(id);
        let attempts = self.config.cas_retries.max(1);
        let limit = self.config.op_timeout();

        for attempt in 1..=attempts {
            let Some(current) = bounded(limit, "session.get", self.backend.get(&key)).await? else {
                return Ok(None);
            };
            let original: SessionRecord = self.codec.decode(&current).map_err(StoreError::from)?;

            let mut record = original.clone();
            let out = change(&mut record)?;
            record.id = original.id.clone();
            record.created_at = original.created_at;

            if record == original {
                return Ok(Some((out, record)));
            }

            let ttl = match self.config.expiry_policy {
                ExpiryPolicy::Absolute => TtlUpdate::Keep,
                ExpiryPolicy::Sliding => {
                    let lifetime = self.config.session_ttl();
                    record.expires_at = Utc::now()
                        + chrono::Duration::seconds(lifetime.as_secs() as i64);
                    TtlUpdate::Reset(lifetime)
                }
            };

            let bytes = self.codec.encode(&record).map_err(StoreError::from)?;
            let swapped = bounded(
                limit,
                "session.compare_and_swap",
                self.backend.compare_and_swap(&key, &current, bytes, ttl),
            )
            .await?;
            if swapped {
                return Ok(Some((out, record)));
            }
            debug!(session_id = %id, attempt, "session changed underneath update, retrying");
        }

        Err(StoreError::Conflict { key, attempts }.into())
    }

    /// Drops expired records from backends that don't expire on their own.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        bounded(
            self.config.op_timeout(),
            "purge_expired",
            self.backend.purge_expired(),
        )
        .await
    }
}
