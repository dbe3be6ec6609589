//! The Access Guard: who gets into a session room.
//!
//! Every navigation to a session runs the guard. It reconciles two sources
//! of truth that can disagree:
//!
//! - the **local cache** the client keeps (which session it thinks it's
//!   in, under which user id), which is editable by the user and therefore
//!   untrusted;
//! - the **Session Store**, which is authoritative.
//!
//! ```text
//! session in store? ──no──→ NoBackendSession        → "/"
//!        │yes
//! cache names this session + a user? ──no──→ NotCached → "/?session=ID"
//!        │yes
//! user in participant list? ──no──→ purge cache, NotCached → "/?session=ID"
//!        │yes
//! password required, not the leader, no valid grant?
//!        ──yes──→ PasswordReauthRequired (cache kept) → "/?session=ID&reauth=1"
//!        │no
//! Authorized → render the room
//! ```
//!
//! A storage failure at any point yields [`GuardDecision::RetryLater`],
//! never a redirect that would throw the user out of a session that may
//! well still exist.

mod cache;
mod error;
mod guard;
mod redirect;

pub use cache::{CachedSession, LocalCache, MemoryCache};
pub use error::GuardError;
pub use guard::{AccessGuard, GuardDecision, GuardState};
pub use redirect::{LandingIntent, LandingParams, Redirect};
