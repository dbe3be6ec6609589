//! # Standup
//!
//! Session identity and access control for short-lived team standups.
//!
//! A leader creates a session (optionally password-protected), shares its
//! link, and participants join under a display name, optionally attaching
//! a verified email so the summary can be mailed to them afterwards. This
//! crate ties the layers together behind one service:
//!
//! ```text
//! StandupService
//!   ├─ RateLimiter        (standup-ratelimit)  every mutating call asks first
//!   ├─ PasswordHasher     (standup-credential) on the blocking pool
//!   ├─ TokenService       (standup-credential) email tokens, access grants
//!   ├─ SessionStore       (standup-store)      CAS updates, bounded timeouts
//!   ├─ VerificationCodeStore
//!   ├─ Mailer             (this crate)         codes and summaries out
//!   └─ AccessGuard        (standup-guard)      room entry decisions
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use standup::prelude::*;
//!
//! # async fn run() -> Result<(), StandupError> {
//! let secret = ServerSecret::new(std::env::var("STANDUP_SECRET").unwrap_or_default())?;
//! let service = StandupBuilder::new()
//!     .secret(secret)
//!     .build(MemoryStore::new(), LogMailer)?;
//!
//! let created = service.create_session("203.0.113.7", "Ana", Some("hunter22")).await?;
//! println!("share /room/{}", created.session_id);
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod email;
mod error;
mod mailer;
mod service;

pub use builder::StandupBuilder;
pub use config::{SessionPolicy, StandupConfig, VerificationConfig};
pub use email::normalize_email;
pub use error::{ErrorKind, StandupError};
pub use mailer::{LogMailer, Mailer, MailerError, MemoryMailer, SentMail};
pub use service::{CreatedSession, FinishedSession, JoinedSession, StandupService};

/// Everything needed to build and drive a [`StandupService`].
pub mod prelude {
    pub use crate::{
        CreatedSession, ErrorKind, FinishedSession, JoinedSession, LogMailer, Mailer, MailerError,
        MemoryMailer, StandupBuilder, StandupConfig, StandupError, StandupService,
    };
    pub use standup_credential::ServerSecret;
    pub use standup_guard::{
        AccessGuard, CachedSession, GuardDecision, GuardState, LandingIntent, LandingParams,
        LocalCache, MemoryCache, Redirect,
    };
    pub use standup_protocol::{SessionId, SessionView, UserId};
    pub use standup_ratelimit::ActionClass;
    pub use standup_store::{ExpiryPolicy, KeyValueStore, MemoryStore};
}
