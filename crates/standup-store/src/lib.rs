//! Expiring persistence for Standup.
//!
//! Everything a session needs to survive between requests lives here:
//! session records, and the short-lived verification codes sent by email.
//! Both sit on top of a [`KeyValueStore`], a small byte-level contract that
//! any TTL-capable backend (Redis, an in-process map) can satisfy.
//!
//! ```text
//! SessionStore / VerificationCodeStore   ← typed, Codec-encoded, bounded by timeouts
//!     ↕
//! KeyValueStore (trait)                  ← bytes + TTL + compare-and-swap
//!     ↕
//! MemoryStore / your backend
//! ```
//!
//! # Key layout
//!
//! ```text
//! session:{session_id}        → SessionRecord JSON     (TTL 4h)
//! verify:{sha256_hex(code)}   → VerificationRecord JSON (TTL 5m)
//! ```
//!
//! # Updates
//!
//! Session updates never do a blind read-modify-write. They read the
//! current bytes, apply the change, and write back with
//! [`KeyValueStore::compare_and_swap`], retrying on conflict. Two
//! participants joining at the same moment both end up in the record.

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod kv;
mod session;
#[cfg(any(test, feature = "test-util"))]
mod testing;
mod verification;

pub use config::{ExpiryPolicy, StoreConfig};
pub use error::StoreError;
pub use kv::{KeyValueStore, MemoryStore, TtlUpdate};
pub use session::{SESSION_KEY_PREFIX, SessionPatch, SessionStore, session_key};
#[cfg(any(test, feature = "test-util"))]
pub use testing::FaultyStore;
pub use verification::{VERIFY_KEY_PREFIX, VerificationCodeStore, code_key};
