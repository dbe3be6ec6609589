//! Email address handling.

use crate::StandupError;

/// Longest address accepted (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

/// Canonical form used as a rate-limit key, in tokens, and in
/// verification records: trimmed and lowercased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Minimal shape check on a normalized address. Deliverability is the
/// verification code's job, not this function's.
pub(crate) fn validate_email(email: &str) -> Result<(), StandupError> {
    let invalid = || StandupError::Validation("a valid email address is required".into());

    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(invalid());
    }
    Ok(())
}
