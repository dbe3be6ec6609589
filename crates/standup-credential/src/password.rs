//! Session password hashing.
//!
//! Passwords are optional per session and only ever compared, never
//! recovered. We store PBKDF2-HMAC-SHA256 output with a per-hash random salt.
//!
//! # Encoding
//!
//! ```text
//! pbkdf2-sha256$100000$<base64(salt ‖ derived key)>
//! └─ algorithm ─┘└iter ┘└──────── 16 + 32 bytes ───────┘
//! ```
//!
//! The algorithm tag and iteration count travel with the hash, so raising
//! the cost later doesn't break hashes issued today. Untagged hashes (bare
//! base64) are read with the legacy parameters.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{CredentialError, constant_time_eq};

/// Lowest PBKDF2 iteration count we will ever hash with.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Upper bound accepted when *reading* a hash, so a corrupted record can't
/// pin a CPU for minutes.
const MAX_ITERATIONS: u32 = 10_000_000;

/// Iteration count assumed for untagged hashes.
const LEGACY_ITERATIONS: u32 = 100_000;

const ALGORITHM_TAG: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// PasswordPolicy
// ---------------------------------------------------------------------------

/// Strength rules checked by callers before a password is hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Minimum length in characters (not bytes).
    pub min_len: usize,
    /// Maximum length in characters. Bounds the work one request can cause.
    pub max_len: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_len: 8,
            max_len: 128,
        }
    }
}

impl PasswordPolicy {
    /// Checks `password` against the policy.
    ///
    /// # Errors
    /// Returns [`CredentialError::WeakPassword`] describing the violated rule.
    pub fn check(&self, password: &str) -> Result<(), CredentialError> {
        let len = password.chars().count();
        if len < self.min_len {
            return Err(CredentialError::WeakPassword(format!(
                "must be at least {} characters",
                self.min_len
            )));
        }
        if len > self.max_len {
            return Err(CredentialError::WeakPassword(format!(
                "must be at most {} characters",
                self.max_len
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PasswordHasher
// ---------------------------------------------------------------------------

/// Hashes and verifies session passwords.
///
/// Cheap to clone; holds only the iteration count. Both operations are
/// deliberately slow (that's the point), so async callers should run them
/// through `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    /// A hasher using [`MIN_ITERATIONS`].
    pub fn new() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
        }
    }

    /// A hasher with a custom cost. Values below [`MIN_ITERATIONS`] are
    /// raised to it.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.clamp(MIN_ITERATIONS, MAX_ITERATIONS),
        }
    }

    /// Returns the iteration count new hashes are produced with.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hashes `password` with a fresh random salt.
    ///
    /// Two calls with the same password produce different strings.
    pub fn hash(&self, password: &str) -> String {
        let salt: [u8; SALT_LEN] = rand::rng().random();
        let key = derive(password, &salt, self.iterations);

        let mut payload = Vec::with_capacity(SALT_LEN + KEY_LEN);
        payload.extend_from_slice(&salt);
        payload.extend_from_slice(&key);

        format!("{ALGORITHM_TAG}${}${}", self.iterations, STANDARD.encode(payload))
    }

    /// Checks `password` against a stored hash.
    ///
    /// Returns `false` for a wrong password and for any malformed `encoded`
    /// value; the two are indistinguishable to the caller.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let Some(stored) = StoredHash::parse(encoded) else {
            tracing::debug!("password hash could not be parsed");
            return false;
        };
        let candidate = derive(password, stored.salt(), stored.iterations);
        constant_time_eq(&candidate, stored.key())
    }

    /// Returns `true` if `encoded` was produced with weaker parameters than
    /// this hasher uses (or is untagged), so it should be re-hashed the next
    /// time the plaintext is available.
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        match StoredHash::parse(encoded) {
            Some(stored) => stored.legacy || stored.iterations < self.iterations,
            None => true,
        }
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// A decoded `salt ‖ key` blob plus the parameters it was made with.
struct StoredHash {
    iterations: u32,
    bytes: Vec<u8>,
    legacy: bool,
}

impl StoredHash {
    fn parse(encoded: &str) -> Option<Self> {
        let (iterations, payload, legacy) = match encoded.split_once('$') {
            Some((ALGORITHM_TAG, rest)) => {
                let (iterations, payload) = rest.split_once('$')?;
                let iterations: u32 = iterations.parse().ok()?;
                (iterations, payload, false)
            }
            Some(_) => return None,
            None => (LEGACY_ITERATIONS, encoded, true),
        };

        // Below the floor, a rewritten record would verify against a cheap
        // derivation.
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
            return None;
        }
        let bytes = STANDARD.decode(payload).ok()?;
        if bytes.len() != SALT_LEN + KEY_LEN {
            return None;
        }
        Some(Self {
            iterations,
            bytes,
            legacy,
        })
    }

    fn salt(&self) -> &[u8] {
        &self.bytes[..SALT_LEN]
    }

    fn key(&self) -> &[u8] {
        &self.bytes[SALT_LEN..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // hash() / verify()
    // =====================================================================

    #[test]
    fn test_verify_correct_password_returns_true() {
        let hasher = PasswordHasher::new();
        let encoded = hasher.hash("correct horse");
        assert!(hasher.verify("correct horse", &encoded));
    }

    #[test]
    fn test_verify_wrong_password_returns_false() {
        let hasher = PasswordHasher::new();
        let encoded = hasher.hash("correct horse");
        assert!(!hasher.verify("correct horsf", &encoded));
        assert!(!hasher.verify("", &encoded));
    }

    #[test]
    fn test_hash_twice_uses_different_salts() {
        let hasher = PasswordHasher::new();
        let first = hasher.hash("same password");
        let second = hasher.hash("same password");

        assert_ne!(first, second, "salt must differ per call");
        assert!(hasher.verify("same password", &first));
        assert!(hasher.verify("same password", &second));
    }

    #[test]
    fn test_hash_is_tagged_with_algorithm_and_iterations() {
        let encoded = PasswordHasher::new().hash("whatever1");
        let parts: Vec<&str> = encoded.split('$').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "pbkdf2-sha256");
        assert_eq!(parts[1], "100000");
        assert_eq!(STANDARD.decode(parts[2]).unwrap().len(), SALT_LEN + KEY_LEN);
    }

    #[test]
    fn test_verify_malformed_input_returns_false() {
        let hasher = PasswordHasher::new();
        for bad in [
            "",
            "$",
            "pbkdf2-sha256$",
            "pbkdf2-sha256$abc$AAAA",
            "pbkdf2-sha256$0$AAAA",
            "scrypt$100000$AAAA",
            "not base64 at all!!",
            "QUJD", // valid base64, wrong length
        ] {
            assert!(!hasher.verify("password", bad), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_verify_truncated_hash_returns_false() {
        let hasher = PasswordHasher::new();
        let encoded = hasher.hash("password123");
        let truncated = &encoded[..encoded.len() - 4];
        assert!(!hasher.verify("password123", truncated));
    }

    #[test]
    fn test_verify_legacy_untagged_hash_still_works() {
        // Hashes written before the format carried a tag are bare base64.
        let salt = [7u8; SALT_LEN];
        let key = derive("legacy-pass", &salt, LEGACY_ITERATIONS);
        let legacy = STANDARD.encode([salt.as_slice(), key.as_slice()].concat());

        let hasher = PasswordHasher::new();
        assert!(hasher.verify("legacy-pass", &legacy));
        assert!(!hasher.verify("other-pass", &legacy));
        assert!(hasher.needs_rehash(&legacy));
    }

    #[test]
    fn test_verify_respects_iterations_stored_in_hash() {
        // A hash made with a higher cost must still verify with a default
        // hasher, because the count comes from the encoding.
        let strong = PasswordHasher::with_iterations(120_000).hash("upgrade-me");
        let hasher = PasswordHasher::new();

        assert!(hasher.verify("upgrade-me", &strong));
        assert!(!hasher.needs_rehash(&strong));
    }

    #[test]
    fn test_verify_weakened_iteration_count_returns_false() {
        let salt = [3u8; SALT_LEN];
        let key = derive("cheap-pass", &salt, 1_000);
        let weakened = format!(
            "{ALGORITHM_TAG}$1000${}",
            STANDARD.encode([salt.as_slice(), key.as_slice()].concat())
        );

        let hasher = PasswordHasher::new();
        assert!(!hasher.verify("cheap-pass", &weakened));
        assert!(hasher.needs_rehash(&weakened));
    }

    #[test]
    fn test_with_iterations_clamps_to_minimum() {
        assert_eq!(PasswordHasher::with_iterations(1).iterations(), MIN_ITERATIONS);
    }

    // =====================================================================
    // PasswordPolicy
    // =====================================================================

    #[test]
    fn test_policy_rejects_short_password() {
        let policy = PasswordPolicy::default();
        assert!(matches!(
            policy.check("seven77"),
            Err(CredentialError::WeakPassword(_))
        ));
        assert!(policy.check("eight888").is_ok());
    }

    #[test]
    fn test_policy_counts_characters_not_bytes() {
        // Eight multibyte characters are eight characters.
        assert!(PasswordPolicy::default().check("ééééééé").is_err());
        assert!(PasswordPolicy::default().check("éééééééé").is_ok());
    }

    #[test]
    fn test_policy_rejects_overlong_password() {
        let policy = PasswordPolicy::default();
        assert!(policy.check(&"x".repeat(129)).is_err());
    }
}
