//! The operations the web layer calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use standup_credential::{EmailSealer, PasswordHasher, TokenService, constant_time_eq};
use standup_guard::AccessGuard;
use standup_protocol::{
    MAX_NAME_LEN, Participant, ParticipantView, SessionId, SessionRecord, SessionView,
    TranscriptEntry, UserId,
};
use standup_ratelimit::{
    ActionClass, MemoryRateLimitStore, RateLimitStore, RateLimiter, spawn_sweeper,
};
use standup_store::{KeyValueStore, MemoryStore, SessionStore, StoreError, VerificationCodeStore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::email::validate_email;
use crate::{LogMailer, Mailer, StandupConfig, StandupError, normalize_email};

/// Digits in an email verification code.
const CODE_DIGITS: usize = 6;

/// Fresh codes tried before giving up when every one collides with a
/// pending code.
const CODE_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// Returned by [`StandupService::create_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: SessionId,
    /// The leader's user id. The client caches it for the access guard.
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Returned by [`StandupService::join_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedSession {
    pub user_id: UserId,
    pub participants: Vec<ParticipantView>,
    /// Present for password-protected sessions. The client caches it so the
    /// access guard doesn't ask for the password again.
    pub access_grant: Option<String>,
}

/// Returned by [`StandupService::finish_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSession {
    pub finished_at: DateTime<Utc>,
    /// Verified emails of the participants who attached one.
    pub emails: Vec<String>,
    /// Addresses the summary could not be delivered to.
    pub undelivered: Vec<String>,
}

// ---------------------------------------------------------------------------
// StandupService
// ---------------------------------------------------------------------------

/// Session identity and access control behind one handle.
///
/// Built by [`StandupBuilder`](crate::StandupBuilder). Every mutating
/// operation consults the rate limiter before doing anything else:
///
/// | operation | action class | keyed by |
/// |---|---|---|
/// | `create_session` | `SessionCreate` | client address |
/// | `join_session` | `SessionJoin` | client address |
/// | `send_email_code` | `EmailCodeSendByClient`, then `EmailCodeSend` | client address, then normalized email |
/// | `verify_email_code` | `EmailCodeVerifyByClient`, then `EmailCodeVerify` | client address, then normalized email |
/// | transcript, summary, finish, leave, delete | `SessionWrite` | user id |
pub struct StandupService<
    S: KeyValueStore = MemoryStore,
    M: Mailer = LogMailer,
    L: RateLimitStore = MemoryRateLimitStore,
> {
    config: StandupConfig,
    sessions: Arc<SessionStore<S>>,
    codes: VerificationCodeStore<S>,
    limiter: Arc<RateLimiter<L>>,
    hasher: PasswordHasher,
    tokens: Arc<TokenService>,
    sealer: EmailSealer,
    mailer: M,
}

impl<S, M, L> StandupService<S, M, L>
where
    S: KeyValueStore,
    M: Mailer,
    L: RateLimitStore,
{
    pub(crate) fn from_parts(
        config: StandupConfig,
        backend: Arc<S>,
        limiter: RateLimiter<L>,
        tokens: TokenService,
        sealer: EmailSealer,
        mailer: M,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(Arc::clone(&backend), config.store.clone()));
        let codes = VerificationCodeStore::new(backend, config.store.clone());
        let hasher = PasswordHasher::with_iterations(config.session.hash_iterations);
        Self {
            config,
            sessions,
            codes,
            limiter: Arc::new(limiter),
            hasher,
            tokens: Arc::new(tokens),
            sealer,
            mailer,
        }
    }

    pub fn config(&self) -> &StandupConfig {
        &self.config
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    /// The key-value backend shared by sessions and verification codes.
    pub fn backend(&self) -> &S {
        self.sessions.backend()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter<L>> {
        &self.limiter
    }

    /// An access guard over the same store and token service.
    pub fn guard(&self) -> AccessGuard<S> {
        AccessGuard::new(Arc::clone(&self.sessions), Arc::clone(&self.tokens))
    }

    /// Starts the background task that evicts stale rate-limit counters.
    /// Must be called from within a Tokio runtime.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        spawn_sweeper(&self.limiter)
    }

    /// Drops expired records from stores without native expiry.
    pub async fn purge_expired(&self) -> Result<usize, StandupError> {
        Ok(self.sessions.purge_expired().await?)
    }

    // -- Sessions ----------------------------------------------------------

    /// Creates a session led by `leader_name`.
    ///
    /// An empty or blank `password` means no password.
    pub async fn create_session(
        &self,
        client: &str,
        leader_name: &str,
        password: Option<&str>,
    ) -> Result<CreatedSession, StandupError> {
        self.limiter
            .check_and_increment(client, ActionClass::SessionCreate)
            .await?;

        let leader_name = validate_name(leader_name)?;
        let password_hash = match non_blank(password) {
            Some(password) => {
                self.config.session.password.check(password)?;
                Some(self.hash_password(password.to_owned()).await?)
            }
            None => None,
        };

        let ttl = self.config.store.session_ttl();
        let record = SessionRecord::new(
            SessionId::generate(),
            UserId::generate(),
            leader_name,
            password_hash,
            chrono::Duration::seconds(ttl.as_secs() as i64),
        );
        self.sessions.set(&record, ttl).await?;

        info!(
            session_id = %record.id,
            protected = record.requires_password(),
            "session created"
        );
        Ok(CreatedSession {
            session_id: record.id,
            user_id: record.leader_id,
            expires_at: record.expires_at,
        })
    }

    /// Adds `name` to a session as a new participant.
    ///
    /// Names are unique within a session, compared case-insensitively. A
    /// name already present is refused rather than resolved to that
    /// participant: a display name is only a claim, so it never hands out
    /// someone else's user id.
    ///
    /// # Errors
    /// - `NotFound` if the session doesn't exist
    /// - `Authentication` for a missing or wrong password, or an invalid
    ///   email token
    /// - `Validation` if the name is invalid or taken, the session is full,
    ///   or it has finished
    pub async fn join_session(
        &self,
        client: &str,
        session_id: &SessionId,
        name: &str,
        password: Option<&str>,
        email_token: Option<&str>,
    ) -> Result<JoinedSession, StandupError> {
        self.limiter
            .check_and_increment(client, ActionClass::SessionJoin)
            .await?;

        let name = validate_name(name)?;
        let sealed_email = match email_token {
            Some(token) => {
                let email = self.tokens.verify_email_token(token)?;
                Some(self.sealer.seal(&email)?)
            }
            None => None,
        };

        let record = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(StandupError::NotFound)?;
        if let Some(hash) = &record.password_hash {
            let Some(password) = password else {
                debug!(%session_id, "join without password on protected session");
                return Err(StandupError::Authentication);
            };
            if !self.verify_password(password.to_owned(), hash.clone()).await? {
                debug!(%session_id, "join with wrong password");
                return Err(StandupError::Authentication);
            }
        }

        let candidate = UserId::generate();
        let max_participants = self.config.session.max_participants;
        let participants = self
            .sessions
            .modify(session_id, |record| {
                if record.is_finished() {
                    return Err(StandupError::Validation("session has finished".into()));
                }
                if record.participants.iter().any(|p| same_name(&p.name, &name)) {
                    return Err(StandupError::Validation("name already taken".into()));
                }
                if record.participants.len() >= max_participants {
                    return Err(StandupError::Validation("session is full".into()));
                }
                record.participants.push(Participant {
                    id: candidate,
                    name: name.clone(),
                    encrypted_email: sealed_email.clone(),
                });
                let participants: Vec<ParticipantView> =
                    record.participants.iter().map(ParticipantView::from).collect();
                Ok(participants)
            })
            .await?
            .ok_or(StandupError::NotFound)?;

        let user_id = candidate;
        let access_grant = if record.requires_password() {
            Some(self.tokens.issue_access_grant(session_id, user_id)?)
        } else {
            None
        };

        info!(%session_id, %user_id, "participant joined");
        Ok(JoinedSession {
            user_id,
            participants,
            access_grant,
        })
    }

    /// The public view of a session. Never includes the password hash or
    /// participant emails.
    pub async fn get_session(&self, session_id: &SessionId) -> Result<SessionView, StandupError> {
        self.sessions
            .get(session_id)
            .await?
            .map(|record| record.view())
            .ok_or(StandupError::NotFound)
    }

    /// Appends a transcript line spoken by `user_id`.
    pub async fn append_transcript(
        &self,
        session_id: &SessionId,
        user_id: UserId,
        text: &str,
    ) -> Result<(), StandupError> {
        self.check_write(user_id).await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(StandupError::Validation("transcript text is empty".into()));
        }
        let max_len = self.config.session.max_transcript_len;
        if text.chars().count() > max_len {
            return Err(StandupError::Validation(format!(
                "transcript text must be at most {max_len} characters"
            )));
        }

        self.sessions
            .modify(session_id, |record| {
                require_participant(record, user_id)?;
                require_open(record)?;
                record
                    .transcripts
                    .get_or_insert_with(Vec::new)
                    .push(TranscriptEntry {
                        user_id,
                        text: text.to_owned(),
                        recorded_at: Utc::now(),
                    });
                Ok::<_, StandupError>(())
            })
            .await?
            .ok_or(StandupError::NotFound)
    }

    /// Stores the session summary. Leader only.
    pub async fn set_summary(
        &self,
        session_id: &SessionId,
        user_id: UserId,
        summary: &str,
    ) -> Result<(), StandupError> {
        self.check_write(user_id).await?;

        self.sessions
            .modify(session_id, |record| {
                require_leader(record, user_id)?;
                record.summary = Some(summary.to_owned());
                Ok::<_, StandupError>(())
            })
            .await?
            .ok_or(StandupError::NotFound)?;
        debug!(%session_id, "summary stored");
        Ok(())
    }

    /// Marks the session finished and mails the summary, if any, to every
    /// participant who attached a verified email. Leader only.
    ///
    /// Finishing twice keeps the first `finished_at`. A failed delivery
    /// doesn't undo the finish; the address is reported in
    /// [`FinishedSession::undelivered`].
    pub async fn finish_session(
        &self,
        session_id: &SessionId,
        user_id: UserId,
    ) -> Result<FinishedSession, StandupError> {
        self.check_write(user_id).await?;

        let now = Utc::now();
        let (finished_at, sealed, summary) = self
            .sessions
            .modify(session_id, |record| {
                require_leader(record, user_id)?;
                let finished_at = *record.finished_at.get_or_insert(now);
                let sealed: Vec<String> = record
                    .participants
                    .iter()
                    .filter_map(|p| p.encrypted_email.clone())
                    .collect();
                Ok::<_, StandupError>((finished_at, sealed, record.summary.clone()))
            })
            .await?
            .ok_or(StandupError::NotFound)?;

        let mut emails = Vec::with_capacity(sealed.len());
        for sealed in &sealed {
            match self.sealer.open(sealed) {
                Ok(email) => emails.push(email),
                Err(_) => warn!(%session_id, "could not open a sealed participant email"),
            }
        }

        let mut undelivered = Vec::new();
        if let Some(summary) = summary.as_deref() {
            for email in &emails {
                if let Err(e) = self.mailer.send_summary(email, session_id, summary).await {
                    warn!(%session_id, error = %e, "summary delivery failed");
                    undelivered.push(email.clone());
                }
            }
        }

        info!(%session_id, recipients = emails.len(), "session finished");
        Ok(FinishedSession {
            finished_at,
            emails,
            undelivered,
        })
    }

    /// Removes `user_id` from the session. When the last participant
    /// leaves, the session is deleted. Returns `true` in that case.
    pub async fn leave_session(
        &self,
        session_id: &SessionId,
        user_id: UserId,
    ) -> Result<bool, StandupError> {
        self.check_write(user_id).await?;

        let remaining = self
            .sessions
            .modify(session_id, |record| {
                require_participant(record, user_id)?;
                record.participants.retain(|p| p.id != user_id);
                Ok::<_, StandupError>(record.participants.len())
            })
            .await?
            .ok_or(StandupError::NotFound)?;

        info!(%session_id, %user_id, remaining, "participant left");
        if remaining == 0 {
            self.sessions.delete(session_id).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Deletes the session now. Leader only.
    pub async fn delete_session(
        &self,
        session_id: &SessionId,
        user_id: UserId,
    ) -> Result<(), StandupError> {
        self.check_write(user_id).await?;

        let record = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(StandupError::NotFound)?;
        require_leader(&record, user_id)?;
        self.sessions.delete(session_id).await?;
        Ok(())
    }

    // -- Email verification --------------------------------------------------

    /// Sends a fresh verification code to `email`.
    ///
    /// Counted against both the requesting client and the email, so
    /// rotating addresses from one client still runs into a quota.
    pub async fn send_email_code(&self, client: &str, email: &str) -> Result<(), StandupError> {
        self.limiter
            .check_and_increment(client, ActionClass::EmailCodeSendByClient)
            .await?;
        let email = normalize_email(email);
        self.limiter
            .check_and_increment(&email, ActionClass::EmailCodeSend)
            .await?;
        validate_email(&email)?;

        let ttl = self.config.store.verification_ttl();
        let mut code = None;
        for _ in 0..CODE_ATTEMPTS {
            let candidate = generate_code();
            if self.codes.put(&candidate, &email, ttl).await? {
                code = Some(candidate);
                break;
            }
            debug!("verification code collided with a pending one, regenerating");
        }
        let code = code.ok_or_else(|| {
            StandupError::Storage(StoreError::Conflict {
                key: "verify:*".into(),
                attempts: CODE_ATTEMPTS,
            })
        })?;

        if let Err(e) = self.mailer.send_verification_code(&email, &code).await {
            // Nobody can use a code that never arrived.
            if let Err(cleanup) = self.codes.consume(&code).await {
                warn!(error = %cleanup, "could not discard undelivered verification code");
            }
            return Err(e.into());
        }

        info!(%email, "verification code sent");
        Ok(())
    }

    /// Checks a code against the email it was sent to and, on success,
    /// returns an email identity token.
    ///
    /// An unknown code, an expired one, and one sent to a different email
    /// all fail with the same `Authentication` error. A code sent to
    /// another email is destroyed after
    /// [`VerificationConfig::max_attempts`](crate::VerificationConfig)
    /// such mismatches.
    pub async fn verify_email_code(
        &self,
        client: &str,
        email: &str,
        code: &str,
    ) -> Result<String, StandupError> {
        self.limiter
            .check_and_increment(client, ActionClass::EmailCodeVerifyByClient)
            .await?;
        let email = normalize_email(email);
        self.limiter
            .check_and_increment(&email, ActionClass::EmailCodeVerify)
            .await?;

        let code = code.trim();
        if code.len() != CODE_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StandupError::Authentication);
        }

        let Some(record) = self.codes.get(code).await? else {
            debug!("unknown or expired verification code");
            return Err(StandupError::Authentication);
        };

        let max_attempts = self.config.verification.max_attempts;
        if record.attempts >= max_attempts {
            self.codes.consume(code).await?;
            return Err(StandupError::Authentication);
        }

        if !constant_time_eq(record.email.as_bytes(), email.as_bytes()) {
            let attempts = self.codes.record_failed_attempt(code).await?;
            if attempts.is_some_and(|n| n >= max_attempts) {
                debug!("verification code exhausted, discarding");
                self.codes.consume(code).await?;
            }
            return Err(StandupError::Authentication);
        }

        // Whoever deletes the record owns the verification.
        if !self.codes.consume(code).await? {
            return Err(StandupError::Authentication);
        }

        info!(%email, "email verified");
        Ok(self.tokens.issue_email_token(&email)?)
    }

    // -- Identity tokens -----------------------------------------------------

    /// Issues an identity token for an email verified out of band.
    pub fn issue_email_token(&self, email: &str) -> Result<String, StandupError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        Ok(self.tokens.issue_email_token(&email)?)
    }

    /// Returns the email an identity token asserts.
    pub fn verify_email_token(&self, token: &str) -> Result<String, StandupError> {
        Ok(self.tokens.verify_email_token(token)?)
    }

    // -- Internals -----------------------------------------------------------

    async fn check_write(&self, user_id: UserId) -> Result<(), StandupError> {
        self.limiter
            .check_and_increment(&user_id.to_string(), ActionClass::SessionWrite)
            .await?;
        Ok(())
    }

    async fn hash_password(&self, password: String) -> Result<String, StandupError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| StandupError::Internal(format!("password hashing task failed: {e}")))
    }

    async fn verify_password(&self, password: String, encoded: String) -> Result<bool, StandupError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
            .await
            .map_err(|e| StandupError::Internal(format!("password check task failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_name(raw: &str) -> Result<String, StandupError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(StandupError::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(StandupError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(StandupError::Validation("name contains control characters".into()));
    }
    Ok(name.to_owned())
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn non_blank(password: Option<&str>) -> Option<&str> {
    password.filter(|p| !p.trim().is_empty())
}

fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:0width$}", width = CODE_DIGITS)
}

fn require_participant(record: &SessionRecord, user_id: UserId) -> Result<(), StandupError> {
    if record.is_participant(&user_id) {
        Ok(())
    } else {
        Err(StandupError::Authentication)
    }
}

fn require_leader(record: &SessionRecord, user_id: UserId) -> Result<(), StandupError> {
    if record.leader_id == user_id {
        Ok(())
    } else {
        Err(StandupError::Authentication)
    }
}

fn require_open(record: &SessionRecord) -> Result<(), StandupError> {
    if record.is_finished() {
        Err(StandupError::Validation("session has finished".into()))
    } else {
        Ok(())
    }
}
