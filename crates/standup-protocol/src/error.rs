//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding or parsing protocol values.
///
/// Every crate in Standup defines its own error enum; a `ProtocolError`
/// always means the bytes or the identifier were wrong, never that a
/// backend was down.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a record into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing required fields,
    /// or bytes written by an incompatible version.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// An identifier supplied from outside doesn't have the expected shape.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
