//! Credentials for Standup.
//!
//! Everything here is stateless and CPU-bound:
//!
//! 1. **Passwords**: salted PBKDF2 hashes for optional session passwords
//!    ([`PasswordHasher`], [`PasswordPolicy`])
//! 2. **Bearer tokens**: HMAC-signed, time-boxed proofs of a verified email
//!    and of a password-checked join ([`TokenService`])
//! 3. **Sealing**: authenticated encryption of participant emails at rest
//!    ([`EmailSealer`])
//!
//! No function here touches storage or holds a lock, so callers are free to
//! run the expensive ones on a blocking thread.

mod ct;
mod error;
mod password;
mod seal;
mod secret;
mod token;

pub use ct::constant_time_eq;
pub use error::CredentialError;
pub use password::{MIN_ITERATIONS, PasswordHasher, PasswordPolicy};
pub use seal::EmailSealer;
pub use secret::{MIN_SECRET_LEN, ServerSecret};
pub use token::{EmailClaims, GrantClaims, TokenConfig, TokenService};
