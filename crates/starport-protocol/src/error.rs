//! Error types for the protocol layer.

/// Errors that can occur while decoding events or encoding records.
///
/// The `#[error("...")]` attributes define the message that shows up in
/// logs when one of these is printed.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, wrong data types, or a record
    /// written by an incompatible version.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The event decoded fine but a field the registry needs is absent or
    /// unusable, e.g. a client connect without a uuid.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
