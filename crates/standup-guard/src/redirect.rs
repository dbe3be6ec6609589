//! Where the guard sends people, and what the landing page makes of it.

use standup_protocol::SessionId;

use crate::{CachedSession, GuardError, LocalCache};

/// A corrective redirect to the landing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// No parameters: start fresh.
    Landing,
    /// Offer to join this session.
    Join(SessionId),
    /// Ask for the session password again, name pre-filled.
    Reauth(SessionId),
}

impl Redirect {
    pub fn to_url(&self) -> String {
        match self {
            Self::Landing => "/".to_owned(),
            Self::Join(id) => format!("/?session={id}"),
            Self::Reauth(id) => format!("/?session={id}&reauth=1"),
        }
    }
}

/// The landing page's query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LandingParams {
    pub session: Option<String>,
    pub reauth: bool,
}

impl LandingParams {
    /// Parses `session=...&reauth=1`, with or without a leading `?`.
    /// Unknown keys are ignored; a repeated key keeps its last value.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "session" if !value.is_empty() => params.session = Some(value.to_owned()),
                "reauth" => params.reauth = value == "1" || value == "true",
                _ => {}
            }
        }
        params
    }
}

/// What the landing page should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandingIntent {
    /// Create-or-join form, nothing pre-filled.
    Fresh,
    /// Join form for this session.
    Join { session_id: SessionId },
    /// Password prompt for a returning participant: name pre-filled from
    /// the cache, password field focused.
    Reauth {
        session_id: SessionId,
        cached: CachedSession,
    },
}

impl LandingIntent {
    /// Resolves the landing parameters against the local cache.
    ///
    /// The re-auth flag is only honoured when the cache actually holds an
    /// identity for that session. A stale or bookmarked `reauth=1` link
    /// without one resolves exactly like a plain join link. A malformed
    /// session id resolves to [`Fresh`](Self::Fresh).
    pub fn resolve<C: LocalCache>(params: &LandingParams, cache: &C) -> Result<Self, GuardError> {
        let Some(session_id) = params
            .session
            .as_deref()
            .and_then(|raw| SessionId::parse(raw).ok())
        else {
            return Ok(Self::Fresh);
        };

        if params.reauth {
            if let Some(cached) = cache.load()? {
                if cached.user_for(&session_id).is_some() {
                    return Ok(Self::Reauth { session_id, cached });
                }
            }
        }
        Ok(Self::Join { session_id })
    }
}
