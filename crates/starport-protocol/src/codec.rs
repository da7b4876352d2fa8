//! Codec trait and implementations.
//!
//! A codec converts between Rust values and bytes. Two places need one:
//! the frame handler, which decodes [`ProtocolEvent`](crate::ProtocolEvent)s
//! handed over by the packet layer, and the record stores, which encode
//! players and planets before writing them to disk. Both go through the
//! [`Codec`] trait so the format can change in one place.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// `Send + Sync + 'static` because a codec is stored inside long-lived
/// shared state that Tokio tasks touch from any worker thread.
///
/// `DeserializeOwned` (rather than `Deserialize<'de>`) means decoded values
/// own their data, so the input buffer can be dropped right away. Stored
/// records come out of the database as short-lived buffers.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Stored records stay human-readable, which makes poking at a player
/// database with a KV inspector painless.
///
/// ## Example
///
/// ```rust
/// use starport_protocol::{Codec, ConnectResponse, JsonCodec, ProtocolEvent};
///
/// let codec = JsonCodec;
/// let event = ProtocolEvent::ConnectResponse(ConnectResponse {
///     success: true,
///     client_id: 7,
/// });
///
/// let bytes = codec.encode(&event).unwrap();
/// let decoded: ProtocolEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
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
