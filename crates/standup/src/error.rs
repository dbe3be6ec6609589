//! Unified error type for Standup.

use std::time::Duration;

use standup_credential::CredentialError;
use standup_protocol::ProtocolError;
use standup_ratelimit::{ActionClass, RateLimitError};
use standup_store::StoreError;

use crate::MailerError;

/// The broad class of a failure, which decides how a caller reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authentication,
    RateLimited,
    NotFound,
    Storage,
    Delivery,
    Internal,
}

/// Top-level error for every [`StandupService`](crate::StandupService)
/// operation.
///
/// Unlike a plain wrapper, the `From` impls here *classify*: a rejected
/// token and a wrong password both become [`Authentication`](Self::Authentication)
/// with no detail, and storage trouble becomes a generic "try again" whose
/// cause is only reachable through [`source()`](std::error::Error::source)
/// for logging.
#[derive(Debug, thiserror::Error)]
pub enum StandupError {
    /// Malformed or out-of-range input. The message is safe to show.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Wrong password, bad code, or invalid token. Never says which.
    #[error("authentication failed")]
    Authentication,

    #[error("too many requests, retry in {}s", retry_after.as_secs())]
    RateLimited {
        action: ActionClass,
        retry_after: Duration,
    },

    /// The session or code doesn't exist, expired, or never existed.
    #[error("not found")]
    NotFound,

    #[error("storage unavailable, try again")]
    Storage(#[source] StoreError),

    #[error("message delivery failed, try again")]
    Delivery(#[source] MailerError),

    /// A server-side fault the caller can do nothing about.
    #[error("internal error")]
    Internal(String),
}

impl StandupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authentication => ErrorKind::Authentication,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NotFound => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Delivery(_) => ErrorKind::Delivery,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The HTTP status a web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::Internal => 500,
            ErrorKind::Delivery => 502,
            ErrorKind::Storage => 503,
        }
    }

    /// Whether repeating the same request can succeed. Rate limited
    /// requests can, after [`retry_after`](Self::retry_after).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::Storage | ErrorKind::Delivery
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<StoreError> for StandupError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}

impl From<MailerError> for StandupError {
    fn from(e: MailerError) -> Self {
        Self::Delivery(e)
    }
}

impl From<RateLimitError> for StandupError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Limited {
                action,
                retry_after,
            } => Self::RateLimited {
                action,
                retry_after,
            },
            RateLimitError::Backend(msg) => Self::Storage(StoreError::Unavailable(msg)),
        }
    }
}

impl From<CredentialError> for StandupError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::WeakPassword(msg) => Self::Validation(msg),
            CredentialError::TokenRejected => Self::Authentication,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ProtocolError> for StandupError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::InvalidId(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
