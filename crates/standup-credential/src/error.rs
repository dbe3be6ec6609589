//! Error types for the credential layer.

/// Errors produced while checking or minting credentials.
///
/// Note what is *not* here: a failed password check is a plain `false`
/// from [`PasswordHasher::verify`](crate::PasswordHasher::verify), and every
/// token failure collapses into [`CredentialError::TokenRejected`]. Callers
/// can't learn which part of a credential was wrong, so neither can an
/// attacker probing them.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The password doesn't meet the strength policy.
    #[error("password rejected: {0}")]
    WeakPassword(String),

    /// The token is malformed, forged, tampered with, of the wrong type,
    /// or expired. Deliberately opaque.
    #[error("token rejected")]
    TokenRejected,

    /// The configured server secret is unusable.
    #[error("invalid server secret: {0}")]
    InvalidSecret(String),

    /// Claims couldn't be serialized while minting a token.
    #[error("failed to encode token claims: {0}")]
    Encode(serde_json::Error),

    /// A sealed email couldn't be produced or opened.
    #[error("email sealing failed")]
    Seal,
}
