//! Signed, time-boxed bearer tokens.
//!
//! Two kinds of token share one format:
//!
//! - **Email identity tokens** (`typ: "EMT"`) prove the holder verified an
//!   email address. Valid for 30 days by default.
//! - **Access grants** (`typ: "SAG"`) prove a participant passed the
//!   session password check. Scoped to one `(session, user)` pair.
//!
//! # Wire format
//!
//! ```text
//! base64url(header) "." base64url(payload) "." base64url(hmac_sha256(header "." payload))
//! ```
//!
//! The header carries `alg`, `typ` and a format version `v`. The server keeps
//! no record of issued tokens: whoever holds one can use it until `exp`, and
//! there is no way to revoke it early.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::Sha256;
use standup_protocol::{SessionId, UserId};

use crate::{CredentialError, ServerSecret, constant_time_eq};

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";
const FORMAT_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Token lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// How long an email identity token stays valid.
    pub email_token_ttl_days: i64,
    /// How long an access grant stays valid. Defaults to the session
    /// lifespan, so a grant never outlives the session it names.
    pub access_grant_ttl_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            email_token_ttl_days: 30,
            access_grant_ttl_secs: 14_400,
        }
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// What an email identity token asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailClaims {
    pub email: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds. The token is valid while `now <= exp`.
    pub exp: i64,
}

/// What an access grant asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantClaims {
    pub sid: SessionId,
    pub uid: UserId,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    EmailIdentity,
    AccessGrant,
}

impl TokenKind {
    fn typ(self) -> &'static str {
        match self {
            Self::EmailIdentity => "EMT",
            Self::AccessGrant => "SAG",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
    v: u8,
}

/// Why a token was rejected. Only ever logged; callers see
/// [`CredentialError::TokenRejected`] for all of these.
#[derive(Debug, Clone, Copy)]
enum RejectReason {
    Malformed,
    Header,
    Signature,
    Payload,
    Expired,
    Subject,
}

// ---------------------------------------------------------------------------
// TokenService
// ---------------------------------------------------------------------------

/// Issues and verifies bearer tokens with the server secret.
///
/// Verification is pure computation: no I/O, no locks, no awaiting.
#[derive(Clone)]
pub struct TokenService {
    /// HMAC keyed once at construction, cloned per signature.
    mac: HmacSha256,
    config: TokenConfig,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Creates a token service keyed with `secret`.
    ///
    /// # Errors
    /// Returns [`CredentialError::InvalidSecret`] if the HMAC can't be keyed.
    pub fn new(secret: &ServerSecret, config: TokenConfig) -> Result<Self, CredentialError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| CredentialError::InvalidSecret(e.to_string()))?;
        Ok(Self { mac, config })
    }

    /// Returns the configured lifetimes.
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    // -- Email identity tokens --------------------------------------------

    /// Issues an identity token for an already-verified `email`.
    pub fn issue_email_token(&self, email: &str) -> Result<String, CredentialError> {
        self.issue_email_token_at(email, Utc::now())
    }

    /// Like [`issue_email_token`](Self::issue_email_token) with an explicit
    /// issue time.
    pub fn issue_email_token_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        let exp = now + Duration::days(self.config.email_token_ttl_days);
        let claims = EmailClaims {
            email: email.to_owned(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        self.sign(TokenKind::EmailIdentity, &claims)
    }

    /// Verifies an identity token and returns the email it asserts.
    ///
    /// # Errors
    /// [`CredentialError::TokenRejected`] for every kind of failure.
    pub fn verify_email_token(&self, token: &str) -> Result<String, CredentialError> {
        self.verify_email_token_at(token, Utc::now())
    }

    /// Like [`verify_email_token`](Self::verify_email_token) against an
    /// explicit clock.
    pub fn verify_email_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        self.open::<EmailClaims>(TokenKind::EmailIdentity, token)
            .and_then(|claims| {
                if claims.email.is_empty() {
                    return Err(RejectReason::Payload);
                }
                check_expiry(claims.exp, now)?;
                Ok(claims.email)
            })
            .map_err(reject)
    }

    // -- Access grants -----------------------------------------------------

    /// Issues a grant proving `user_id` passed the password check for
    /// `session_id`.
    pub fn issue_access_grant(
        &self,
        session_id: &SessionId,
        user_id: UserId,
    ) -> Result<String, CredentialError> {
        self.issue_access_grant_at(session_id, user_id, Utc::now())
    }

    /// Like [`issue_access_grant`](Self::issue_access_grant) with an
    /// explicit issue time.
    pub fn issue_access_grant_at(
        &self,
        session_id: &SessionId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        let exp = now + Duration::seconds(self.config.access_grant_ttl_secs);
        let claims = GrantClaims {
            sid: session_id.clone(),
            uid: user_id,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        self.sign(TokenKind::AccessGrant, &claims)
    }

    /// Verifies that `token` is a live grant for exactly this
    /// `(session_id, user_id)` pair.
    pub fn verify_access_grant(
        &self,
        token: &str,
        session_id: &SessionId,
        user_id: UserId,
    ) -> Result<(), CredentialError> {
        self.verify_access_grant_at(token, session_id, user_id, Utc::now())
    }

    /// Like [`verify_access_grant`](Self::verify_access_grant) against an
    /// explicit clock.
    pub fn verify_access_grant_at(
        &self,
        token: &str,
        session_id: &SessionId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        self.open::<GrantClaims>(TokenKind::AccessGrant, token)
            .and_then(|claims| {
                if claims.sid != *session_id || claims.uid != user_id {
                    return Err(RejectReason::Subject);
                }
                check_expiry(claims.exp, now)
            })
            .map_err(reject)
    }

    // -- Internals ---------------------------------------------------------

    fn sign<C: Serialize>(&self, kind: TokenKind, claims: &C) -> Result<String, CredentialError> {
        let header = Header {
            alg: ALG.to_owned(),
            typ: kind.typ().to_owned(),
            v: FORMAT_VERSION,
        };
        let header = serde_json::to_vec(&header).map_err(CredentialError::Encode)?;
        let payload = serde_json::to_vec(claims).map_err(CredentialError::Encode)?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = self.signature(signing_input.as_bytes());
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Checks structure, header and signature, then decodes the claims.
    /// Expiry and subject checks are left to the caller.
    fn open<C: DeserializeOwned>(&self, kind: TokenKind, token: &str) -> Result<C, RejectReason> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(RejectReason::Malformed);
        };

        let header: Header = decode_segment(header_b64).ok_or(RejectReason::Header)?;
        if header.alg != ALG || header.typ != kind.typ() || header.v != FORMAT_VERSION {
            return Err(RejectReason::Header);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| RejectReason::Signature)?;
        let signing_input_len = header_b64.len() + 1 + payload_b64.len();
        let expected = self.signature(&token.as_bytes()[..signing_input_len]);
        if !constant_time_eq(&expected, &provided) {
            return Err(RejectReason::Signature);
        }

        decode_segment(payload_b64).ok_or(RejectReason::Payload)
    }

    fn signature(&self, signing_input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(signing_input);
        mac.finalize().into_bytes().to_vec()
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn check_expiry(exp: i64, now: DateTime<Utc>) -> Result<(), RejectReason> {
    if now.timestamp() > exp {
        return Err(RejectReason::Expired);
    }
    Ok(())
}

fn reject(reason: RejectReason) -> CredentialError {
    tracing::debug!(?reason, "token rejected");
    CredentialError::TokenRejected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        let secret = ServerSecret::new(vec![0x42; 32]).unwrap();
        TokenService::new(&secret, TokenConfig::default()).unwrap()
    }

    fn other_service() -> TokenService {
        let secret = ServerSecret::new(vec![0x24; 32]).unwrap();
        TokenService::new(&secret, TokenConfig::default()).unwrap()
    }

    /// Flips one character in segment `index` to a different base64url char.
    fn tamper(token: &str, index: usize) -> String {
        let mut segments: Vec<String> = token.split('.').map(str::to_owned).collect();
        let seg = &mut segments[index];
        let first = seg.remove(0);
        seg.insert(0, if first == 'A' { 'B' } else { 'A' });
        segments.join(".")
    }

    // =====================================================================
    // Email identity tokens
    // =====================================================================

    #[test]
    fn test_verify_email_token_fresh_token_returns_email() {
        let svc = service();
        let token = svc.issue_email_token("ana@example.com").unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(svc.verify_email_token(&token).unwrap(), "ana@example.com");
    }

    #[test]
    fn test_verify_email_token_header_carries_version_and_type() {
        let token = service().issue_email_token("ana@example.com").unwrap();
        let header_b64 = token.split('.').next().unwrap();
        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).unwrap()).unwrap();

        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "EMT");
        assert_eq!(header["v"], 1);
    }

    #[test]
    fn test_verify_email_token_tampered_payload_is_rejected() {
        let svc = service();
        let token = svc.issue_email_token("ana@example.com").unwrap();

        let result = svc.verify_email_token(&tamper(&token, 1));

        assert!(matches!(result, Err(CredentialError::TokenRejected)));
    }

    #[test]
    fn test_verify_email_token_tampered_signature_is_rejected() {
        let svc = service();
        let token = svc.issue_email_token("ana@example.com").unwrap();

        assert!(svc.verify_email_token(&tamper(&token, 2)).is_err());
    }

    #[test]
    fn test_verify_email_token_swapped_payload_is_rejected() {
        // Splice Bob's payload onto Ana's signature.
        let svc = service();
        let ana = svc.issue_email_token("ana@example.com").unwrap();
        let bob = svc.issue_email_token("bob@example.com").unwrap();
        let a: Vec<&str> = ana.split('.').collect();
        let b: Vec<&str> = bob.split('.').collect();

        let forged = format!("{}.{}.{}", a[0], b[1], a[2]);

        assert!(svc.verify_email_token(&forged).is_err());
    }

    #[test]
    fn test_verify_email_token_wrong_secret_is_rejected() {
        let token = other_service().issue_email_token("ana@example.com").unwrap();
        assert!(service().verify_email_token(&token).is_err());
    }

    #[test]
    fn test_verify_email_token_wrong_segment_count_is_rejected() {
        let svc = service();
        let token = svc.issue_email_token("ana@example.com").unwrap();

        for bad in [
            String::new(),
            "a.b".to_owned(),
            format!("{token}.extra"),
            token.replacen('.', "", 1),
        ] {
            assert!(svc.verify_email_token(&bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_verify_email_token_after_expiry_is_rejected() {
        let svc = service();
        let issued = Utc::now();
        let token = svc.issue_email_token_at("ana@example.com", issued).unwrap();

        let last_valid = issued + Duration::days(30);
        assert!(svc.verify_email_token_at(&token, last_valid).is_ok());

        let expired = last_valid + Duration::seconds(1);
        assert!(matches!(
            svc.verify_email_token_at(&token, expired),
            Err(CredentialError::TokenRejected)
        ));
    }

    #[test]
    fn test_verify_email_token_missing_email_field_is_rejected() {
        // Correctly signed, but the payload lacks `email`.
        let svc = service();
        let forged = svc
            .sign(
                TokenKind::EmailIdentity,
                &serde_json::json!({ "iat": 0, "exp": i64::MAX }),
            )
            .unwrap();

        assert!(svc.verify_email_token(&forged).is_err());
    }

    #[test]
    fn test_verify_email_token_all_failures_look_identical() {
        let svc = service();
        let token = svc.issue_email_token("ana@example.com").unwrap();
        let far_future = Utc::now() + Duration::days(365);

        let errors = [
            svc.verify_email_token("garbage").unwrap_err().to_string(),
            svc.verify_email_token(&tamper(&token, 2)).unwrap_err().to_string(),
            svc.verify_email_token_at(&token, far_future)
                .unwrap_err()
                .to_string(),
        ];

        assert!(errors.iter().all(|e| e == "token rejected"), "{errors:?}");
    }

    // =====================================================================
    // Access grants
    // =====================================================================

    #[test]
    fn test_verify_access_grant_matching_pair_succeeds() {
        let svc = service();
        let sid = SessionId::generate();
        let uid = UserId::generate();
        let grant = svc.issue_access_grant(&sid, uid).unwrap();

        assert!(svc.verify_access_grant(&grant, &sid, uid).is_ok());
    }

    #[test]
    fn test_verify_access_grant_other_user_or_session_is_rejected() {
        let svc = service();
        let sid = SessionId::generate();
        let uid = UserId::generate();
        let grant = svc.issue_access_grant(&sid, uid).unwrap();

        assert!(svc.verify_access_grant(&grant, &sid, UserId::generate()).is_err());
        assert!(svc
            .verify_access_grant(&grant, &SessionId::generate(), uid)
            .is_err());
    }

    #[test]
    fn test_tokens_do_not_verify_as_the_other_kind() {
        let svc = service();
        let sid = SessionId::generate();
        let uid = UserId::generate();
        let grant = svc.issue_access_grant(&sid, uid).unwrap();
        let email = svc.issue_email_token("ana@example.com").unwrap();

        assert!(svc.verify_email_token(&grant).is_err());
        assert!(svc.verify_access_grant(&email, &sid, uid).is_err());
    }

    #[test]
    fn test_verify_access_grant_after_ttl_is_rejected() {
        let svc = service();
        let sid = SessionId::generate();
        let uid = UserId::generate();
        let issued = Utc::now();
        let grant = svc.issue_access_grant_at(&sid, uid, issued).unwrap();

        let later = issued + Duration::seconds(14_401);

        assert!(svc.verify_access_grant_at(&grant, &sid, uid, later).is_err());
    }
}
