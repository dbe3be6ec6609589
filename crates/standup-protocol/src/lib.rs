//! Shared vocabulary for Standup.
//!
//! This crate defines the data every other layer agrees on:
//!
//! - **Identifiers** ([`SessionId`], [`UserId`]): newtypes so a session id
//!   can never be passed where a user id is expected.
//! - **Records** ([`SessionRecord`], [`VerificationRecord`]): what the
//!   Session Store persists.
//! - **Views** ([`SessionView`], [`ParticipantView`]): what leaves the
//!   server. A view never carries the password hash or sealed emails.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records are turned
//!   into bytes for the key-value backend.
//!
//! ```text
//! Guard / Facade (above)  ← read views, mutate records
//!     ↕
//! Store (above)           ← persists records through a Codec
//!     ↕
//! Protocol (this crate)   ← types only, no I/O
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    MAX_NAME_LEN, Participant, ParticipantView, SessionId, SessionRecord,
    SessionView, TranscriptEntry, UserId, VerificationRecord,
};
