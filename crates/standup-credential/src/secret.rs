//! The server-side signing secret.

use std::fmt;

use crate::CredentialError;

/// Shortest secret accepted, in bytes. Matches the HMAC-SHA256 output size.
pub const MIN_SECRET_LEN: usize = 32;

/// Key material shared by the token service and the email sealer.
///
/// `Debug` is written by hand so the secret never ends up in a log line.
#[derive(Clone)]
pub struct ServerSecret(Vec<u8>);

impl ServerSecret {
    /// Wraps raw key material.
    ///
    /// # Errors
    /// Returns [`CredentialError::InvalidSecret`] if shorter than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CredentialError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(CredentialError::InvalidSecret(format!(
                "need at least {MIN_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerSecret(..)")
    }
}
