//! Core types: identifiers, persisted records and their public views.
//!
//! Records are what the Session Store writes to the backend. Views are what
//! a caller outside the server is allowed to see. Keeping them as separate
//! types means forgetting to strip the password hash is a compile error,
//! not a leak.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

/// Longest display name accepted for a leader or participant, in characters.
pub const MAX_NAME_LEN: usize = 50;

/// Bytes of randomness in a session id (256 bits).
const SESSION_ID_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a standup session.
///
/// 32 random bytes, lowercase hex (64 characters). The id appears in the
/// room URL, so it doubles as the capability needed to find the session;
/// 256 bits keeps it unguessable.
///
/// `#[serde(transparent)]` serializes this as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn generate() -> Self {
        let bytes: [u8; SESSION_ID_BYTES] = rand::rng().random();
        Self(hex::encode(bytes))
    }

    /// Parses an id supplied from outside (URL segment, form field).
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidId`] unless the input is exactly
    /// 64 lowercase hex characters.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let well_formed = raw.len() == SESSION_ID_BYTES * 2
            && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !well_formed {
            return Err(ProtocolError::InvalidId(
                "session id must be 64 lowercase hex characters".into(),
            ));
        }
        Ok(Self(raw.to_owned()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unique identifier for a participant within a session.
///
/// A random v4 UUID. The client keeps it in its local cache and presents it
/// back to the Access Guard, which never trusts it without checking the
/// participant list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generates a fresh random user id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a user id from its hyphenated string form.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidId`] if the input isn't a UUID.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidId("user id must be a UUID".into()))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// One member of a session, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
    /// The participant's verified email, sealed with the server key.
    /// Only present when they joined with a valid email token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_email: Option<String>,
}

/// A single transcript line contributed by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub user_id: UserId,
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

/// The persisted state of a standup session.
///
/// `id` and `created_at` are fixed at creation; the store pins them on
/// every update no matter what the caller writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub leader_name: String,
    /// The creator's user id. The creator proved password knowledge when
    /// creating, which exempts them from re-authentication.
    pub leader_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcripts: Option<Vec<TranscriptEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Builds a new record with the leader as its first participant.
    pub fn new(
        id: SessionId,
        leader_id: UserId,
        leader_name: String,
        password_hash: Option<String>,
        lifetime: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            created_at,
            expires_at: created_at + lifetime,
            leader_name: leader_name.clone(),
            leader_id,
            password_hash,
            participants: vec![Participant {
                id: leader_id,
                name: leader_name,
                encrypted_email: None,
            }],
            transcripts: None,
            summary: None,
            finished_at: None,
        }
    }

    /// Returns `true` if joining requires the session password.
    pub fn requires_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Returns `true` if `user_id` is in the participant list.
    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|p| p.id == *user_id)
    }

    /// Finds a participant by display name, ignoring case.
    pub fn participant_named(&self, name: &str) -> Option<&Participant> {
        let wanted = name.trim().to_lowercase();
        self.participants
            .iter()
            .find(|p| p.name.trim().to_lowercase() == wanted)
    }

    /// Returns `true` once the leader has finished the session.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Projects the record onto what callers outside the server may see.
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            leader_name: self.leader_name.clone(),
            leader_id: self.leader_id,
            requires_password: self.requires_password(),
            participants: self.participants.iter().map(ParticipantView::from).collect(),
            transcripts: self.transcripts.clone().unwrap_or_default(),
            summary: self.summary.clone(),
            finished_at: self.finished_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Public views
// ---------------------------------------------------------------------------

/// A participant as other clients see them: no email, sealed or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: UserId,
    pub name: String,
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
        }
    }
}

/// The public projection of a session. Never includes the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub leader_name: String,
    pub leader_id: UserId,
    pub requires_password: bool,
    pub participants: Vec<ParticipantView>,
    pub transcripts: Vec<TranscriptEntry>,
    pub summary: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Verification code record
// ---------------------------------------------------------------------------

/// A pending email verification, stored under the hash of its code.
///
/// The code itself is never persisted. The record is deleted on successful
/// verification and otherwise disappears with its TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

impl VerificationRecord {
    /// A fresh record with no failed attempts.
    pub fn new(email: String) -> Self {
        Self {
            email,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}
