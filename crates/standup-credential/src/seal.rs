//! Sealing participant emails at rest.
//!
//! A participant who joins with a verified email has it stored on their
//! record so the summary can be mailed to them when the session finishes.
//! The address is encrypted with ChaCha20-Poly1305 under a key derived from
//! the server secret, so a dump of the session store doesn't leak it.
//!
//! Format: `v1.` followed by base64url(nonce ‖ ciphertext).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::{CredentialError, ServerSecret};

const SEAL_PREFIX: &str = "v1.";
const NONCE_LEN: usize = 12;
/// Separates the sealing key from every other use of the server secret.
const KEY_CONTEXT: &[u8] = b"standup/email-seal/v1";

/// Encrypts and decrypts participant emails.
#[derive(Clone)]
pub struct EmailSealer {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for EmailSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EmailSealer(..)")
    }
}

impl EmailSealer {
    /// Derives the sealing key from `secret`.
    pub fn new(secret: &ServerSecret) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_CONTEXT);
        hasher.update(secret.as_bytes());
        let key = hasher.finalize();
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_slice())),
        }
    }

    /// Encrypts `email` under a fresh random nonce.
    pub fn seal(&self, email: &str) -> Result<String, CredentialError> {
        let nonce: [u8; NONCE_LEN] = rand::rng().random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), email.as_bytes())
            .map_err(|_| CredentialError::Seal)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(format!("{SEAL_PREFIX}{}", URL_SAFE_NO_PAD.encode(out)))
    }

    /// Decrypts a value produced by [`seal`](Self::seal).
    ///
    /// # Errors
    /// [`CredentialError::Seal`] if the value is malformed, was sealed under
    /// another secret, or has been modified.
    pub fn open(&self, sealed: &str) -> Result<String, CredentialError> {
        let body = sealed.strip_prefix(SEAL_PREFIX).ok_or(CredentialError::Seal)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| CredentialError::Seal)?;
        if bytes.len() <= NONCE_LEN {
            return Err(CredentialError::Seal);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialError::Seal)?;
        String::from_utf8(plaintext).map_err(|_| CredentialError::Seal)
    }
}
