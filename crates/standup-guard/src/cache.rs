//! The client-side identity cache.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use standup_protocol::{SessionId, UserId};

use crate::GuardError;

/// What a client remembers about the session it last joined.
///
/// Nothing here is trusted on its own. The guard checks `user_id` against
/// the participant list and `access_grant` against the server's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSession {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Pre-fills the name field when the user has to re-enter a password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// The grant returned by a password-checked join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_grant: Option<String>,
}

impl CachedSession {
    /// The cached user for `session_id`, if the cache is about that
    /// session and carries a user id.
    pub fn user_for(&self, session_id: &SessionId) -> Option<UserId> {
        if self.session_id == *session_id {
            self.user_id
        } else {
            None
        }
    }
}

/// Client-held storage for one [`CachedSession`].
///
/// In a browser this is local storage; the guard only needs these three
/// operations. `purge` wipes everything, not just one session.
pub trait LocalCache {
    fn load(&self) -> Result<Option<CachedSession>, GuardError>;
    fn store(&self, session: CachedSession) -> Result<(), GuardError>;
    fn purge(&self) -> Result<(), GuardError>;
}

/// A [`LocalCache`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<CachedSession>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache already holding `session`.
    pub fn with(session: CachedSession) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedSession>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LocalCache for MemoryCache {
    fn load(&self) -> Result<Option<CachedSession>, GuardError> {
        Ok(self.lock().clone())
    }

    fn store(&self, session: CachedSession) -> Result<(), GuardError> {
        *self.lock() = Some(session);
        Ok(())
    }

    fn purge(&self) -> Result<(), GuardError> {
        *self.lock() = None;
        Ok(())
    }
}
