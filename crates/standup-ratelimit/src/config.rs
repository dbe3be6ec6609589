//! Action classes and their quotas.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ActionClass
// ---------------------------------------------------------------------------

/// A category of request that gets its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// Creating a session. Keyed by client address.
    SessionCreate,
    /// Joining a session. Keyed by client address.
    SessionJoin,
    /// Requesting an email verification code. Keyed by email.
    EmailCodeSend,
    /// Submitting a verification code. Keyed by email.
    EmailCodeVerify,
    /// Requesting verification codes for any email. Keyed by client
    /// address.
    EmailCodeSendByClient,
    /// Submitting verification codes for any email. Keyed by client
    /// address.
    EmailCodeVerifyByClient,
    /// Transcript, summary, finish and leave writes. Keyed by user id.
    SessionWrite,
}

impl ActionClass {
    pub const ALL: [Self; 7] = [
        Self::SessionCreate,
        Self::SessionJoin,
        Self::EmailCodeSend,
        Self::EmailCodeVerify,
        Self::EmailCodeSendByClient,
        Self::EmailCodeVerifyByClient,
        Self::SessionWrite,
    ];
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SessionCreate => "session-create",
            Self::SessionJoin => "session-join",
            Self::EmailCodeSend => "email-code-send",
            Self::EmailCodeVerify => "email-code-verify",
            Self::EmailCodeSendByClient => "email-code-send-by-client",
            Self::EmailCodeVerifyByClient => "email-code-verify-by-client",
            Self::SessionWrite => "session-write",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// RateLimitRule
// ---------------------------------------------------------------------------

/// `max_requests` per `window_secs`, counted in fixed windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    /// The window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

// ---------------------------------------------------------------------------
// RateLimitConfig
// ---------------------------------------------------------------------------

/// Quotas per action class, plus how often stale counters are swept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub session_create: RateLimitRule,
    pub session_join: RateLimitRule,
    pub email_code_send: RateLimitRule,
    pub email_code_verify: RateLimitRule,
    pub email_code_send_by_client: RateLimitRule,
    pub email_code_verify_by_client: RateLimitRule,
    pub session_write: RateLimitRule,
    /// Seconds between sweeps of elapsed windows. 0 disables the sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            session_create: RateLimitRule::new(5, 3_600),
            session_join: RateLimitRule::new(10, 3_600),
            email_code_send: RateLimitRule::new(10, 3_600),
            email_code_verify: RateLimitRule::new(5, 900),
            email_code_send_by_client: RateLimitRule::new(20, 3_600),
            email_code_verify_by_client: RateLimitRule::new(20, 900),
            session_write: RateLimitRule::new(120, 3_600),
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitConfig {
    /// The rule that applies to `action`.
    pub fn rule(&self, action: ActionClass) -> RateLimitRule {
        match action {
            ActionClass::SessionCreate => self.session_create,
            ActionClass::SessionJoin => self.session_join,
            ActionClass::EmailCodeSend => self.email_code_send,
            ActionClass::EmailCodeVerify => self.email_code_verify,
            ActionClass::EmailCodeSendByClient => self.email_code_send_by_client,
            ActionClass::EmailCodeVerifyByClient => self.email_code_verify_by_client,
            ActionClass::SessionWrite => self.session_write,
        }
    }

    /// The sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}
