//! Outgoing email.
//!
//! Standup doesn't talk to a mail provider itself. It hands messages to a
//! [`Mailer`]: wire one up to SMTP, Resend or whatever you use. Two
//! implementations ship here:
//!
//! - [`LogMailer`] logs that a message would have gone out (never its
//!   code or summary text).
//! - [`MemoryMailer`] keeps an outbox in memory, for tests and demos.

use std::sync::{Mutex, MutexGuard};

use standup_protocol::SessionId;
use tracing::info;

/// Errors a [`Mailer`] can report.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    /// The provider refused this message.
    #[error("mail provider rejected the message: {0}")]
    Rejected(String),

    /// The provider couldn't be reached.
    #[error("mail provider unavailable: {0}")]
    Unavailable(String),
}

/// Delivers verification codes and session summaries.
///
/// # Trait bounds
///
/// `Send + Sync + 'static`: one mailer is shared by every request the
/// service handles, across tasks.
pub trait Mailer: Send + Sync + 'static {
    fn send_verification_code(
        &self,
        email: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), MailerError>> + Send;

    fn send_summary(
        &self,
        email: &str,
        session_id: &SessionId,
        summary: &str,
    ) -> impl Future<Output = Result<(), MailerError>> + Send;
}

// ---------------------------------------------------------------------------
// LogMailer
// ---------------------------------------------------------------------------

/// A [`Mailer`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send_verification_code(&self, email: &str, _code: &str) -> Result<(), MailerError> {
        info!(%email, "verification code email (not sent: log mailer)");
        Ok(())
    }

    async fn send_summary(
        &self,
        email: &str,
        session_id: &SessionId,
        summary: &str,
    ) -> Result<(), MailerError> {
        info!(
            %email,
            %session_id,
            summary_len = summary.len(),
            "summary email (not sent: log mailer)"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryMailer
// ---------------------------------------------------------------------------

/// A message captured by [`MemoryMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMail {
    VerificationCode {
        email: String,
        code: String,
    },
    Summary {
        email: String,
        session_id: SessionId,
        summary: String,
    },
}

/// A [`Mailer`] that records every message instead of sending it.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<SentMail>>,
    failing: Mutex<Option<String>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentMail> {
        lock(&self.outbox).clone()
    }

    /// The most recent verification code sent to `email`.
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        lock(&self.outbox).iter().rev().find_map(|mail| match mail {
            SentMail::VerificationCode { email: to, code } if to == email => Some(code.clone()),
            _ => None,
        })
    }

    /// Makes every send fail with [`MailerError::Unavailable`] until
    /// called again with `None`.
    pub fn fail_with(&self, reason: Option<&str>) {
        *lock(&self.failing) = reason.map(str::to_owned);
    }

    fn deliver(&self, mail: SentMail) -> Result<(), MailerError> {
        if let Some(reason) = lock(&self.failing).clone() {
            return Err(MailerError::Unavailable(reason));
        }
        lock(&self.outbox).push(mail);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Mailer for MemoryMailer {
    async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), MailerError> {
        self.deliver(SentMail::VerificationCode {
            email: email.to_owned(),
            code: code.to_owned(),
        })
    }

    async fn send_summary(
        &self,
        email: &str,
        session_id: &SessionId,
        summary: &str,
    ) -> Result<(), MailerError> {
        self.deliver(SentMail::Summary {
            email: email.to_owned(),
            session_id: session_id.clone(),
            summary: summary.to_owned(),
        })
    }
}
