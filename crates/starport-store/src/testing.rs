//! Test helpers shared by the store modules.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Serialize, de::DeserializeOwned};
use starport_protocol::{Codec, JsonCodec, ProtocolError};

/// JSON codec that allows a fixed number of encodes, then fails every one
/// after that. Decoding always works.
pub(crate) struct RationedCodec {
    remaining: AtomicUsize,
}

impl RationedCodec {
    pub(crate) fn new(encodes: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(encodes),
        }
    }
}

impl Codec for RationedCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| ProtocolError::MalformedPayload("out of encodes".to_string()))?;
        JsonCodec.encode(value)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        JsonCodec.decode(data)
    }
}
