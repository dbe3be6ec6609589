//! The guard state machine.

use std::sync::Arc;

use standup_credential::TokenService;
use standup_protocol::{SessionId, SessionView};
use standup_store::{KeyValueStore, SessionStore};
use tracing::{debug, warn};

use crate::{GuardError, LocalCache, Redirect};

// ---------------------------------------------------------------------------
// GuardState
// ---------------------------------------------------------------------------

/// Where a navigation ended up.
///
/// Only `Authorized` renders the room. Every other state is answered with a
/// redirect to the landing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// The session doesn't exist (never did, expired, or was deleted).
    NoBackendSession,
    /// The session exists but this client has no usable identity for it.
    NotCached,
    /// The client is a participant but must prove the password again.
    PasswordReauthRequired,
    Authorized,
}

impl GuardState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

/// The guard's answer for one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the room with this view.
    Render(SessionView),
    /// Send the client to the landing page.
    Redirect { state: GuardState, to: Redirect },
    /// The store couldn't be consulted. Show a generic "try again" and
    /// leave the client where it is.
    RetryLater,
}

impl GuardDecision {
    /// The state behind this decision, if one was reached.
    pub fn state(&self) -> Option<GuardState> {
        match self {
            Self::Render(_) => Some(GuardState::Authorized),
            Self::Redirect { state, .. } => Some(*state),
            Self::RetryLater => None,
        }
    }

    /// The redirect target, if any.
    pub fn redirect(&self) -> Option<&Redirect> {
        match self {
            Self::Redirect { to, .. } => Some(to),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AccessGuard
// ---------------------------------------------------------------------------

/// Runs the access checks against a session store.
///
/// Cheap to clone; clones share the store and token service.
pub struct AccessGuard<S: KeyValueStore> {
    sessions: Arc<SessionStore<S>>,
    tokens: Arc<TokenService>,
}

impl<S: KeyValueStore> Clone for AccessGuard<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<S: KeyValueStore> AccessGuard<S> {
    pub fn new(sessions: Arc<SessionStore<S>>, tokens: Arc<TokenService>) -> Self {
        Self { sessions, tokens }
    }

    /// Decides what to do with a navigation to `session_id`.
    ///
    /// May purge `cache` (when it claims a membership the store doesn't
    /// know about). Never fails: storage trouble becomes
    /// [`GuardDecision::RetryLater`].
    pub async fn check<C: LocalCache>(&self, session_id: &SessionId, cache: &C) -> GuardDecision {
        match self.evaluate(session_id, cache).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(%session_id, error = %e, "access check could not complete");
                GuardDecision::RetryLater
            }
        }
    }

    /// Like [`check`](Self::check), but hands back the error instead of
    /// folding it into `RetryLater`.
    pub async fn evaluate<C: LocalCache>(
        &self,
        session_id: &SessionId,
        cache: &C,
    ) -> Result<GuardDecision, GuardError> {
        // 1. Does the session exist at all?
        let Some(record) = self.sessions.get(session_id).await? else {
            debug!(%session_id, "no such session");
            return Ok(redirect(GuardState::NoBackendSession, Redirect::Landing));
        };

        // 2. Does the client know who it is in this session?
        let cached = cache.load()?;
        let Some((entry, user_id)) = cached
            .and_then(|entry| entry.user_for(session_id).map(|user_id| (entry, user_id)))
        else {
            debug!(%session_id, "no cached identity for session");
            return Ok(redirect(GuardState::NotCached, Redirect::Join(session_id.clone())));
        };

        // 3. The cache is the client's word. Check it.
        if !record.is_participant(&user_id) {
            debug!(%session_id, %user_id, "cached user is not a participant, purging cache");
            cache.purge()?;
            return Ok(redirect(GuardState::NotCached, Redirect::Join(session_id.clone())));
        }

        // 4. Password sessions want proof, unless this is the leader or
        //    the client holds a grant we signed for exactly this user.
        if record.requires_password() && user_id != record.leader_id {
            let granted = entry.access_grant.as_deref().is_some_and(|grant| {
                self.tokens
                    .verify_access_grant(grant, session_id, user_id)
                    .is_ok()
            });
            if !granted {
                debug!(%session_id, %user_id, "password re-authentication required");
                return Ok(redirect(
                    GuardState::PasswordReauthRequired,
                    Redirect::Reauth(session_id.clone()),
                ));
            }
        }

        // 5.
        debug!(%session_id, %user_id, "access granted");
        Ok(GuardDecision::Render(record.view()))
    }
}

fn redirect(state: GuardState, to: Redirect) -> GuardDecision {
    GuardDecision::Redirect { state, to }
}
