//! Codec trait and implementations for persisting records as bytes.
//!
//! The key-value backends behind the Session Store only understand bytes.
//! A codec converts records to and from those bytes. The store doesn't care
//! HOW a record is serialized, only that something implements [`Codec`].
//!
//! We ship [`JsonCodec`]: readable in a `redis-cli` session or a debugger,
//! which matters more here than a few saved bytes on records that live for
//! a few hours.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → stores are shared across Tokio tasks, and so is their
///   codec.
/// - `'static` → the codec owns everything it needs.
///
/// `DeserializeOwned` (vs plain `Deserialize`) means the decoded record
/// doesn't borrow from the input buffer, so the store can drop the raw
/// bytes as soon as decoding finishes.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use standup_protocol::{Codec, JsonCodec, VerificationRecord};
///
/// let codec = JsonCodec;
/// let record = VerificationRecord::new("ana@example.com".into());
///
/// let bytes = codec.encode(&record).unwrap();
/// let decoded: VerificationRecord = codec.decode(&bytes).unwrap();
/// assert_eq!(record, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
