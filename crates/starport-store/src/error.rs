//! Error types for the persistence layer.

use std::time::Duration;

use starport_protocol::{PlayerUuid, ProtocolError};
use starport_transport::ConnectionId;

/// Errors that can occur while reading or writing records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The embedded database refused a read, write, or flush.
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),

    /// A record couldn't be encoded, or a stored record couldn't be decoded.
    #[error("record codec failure: {0}")]
    Codec(#[from] ProtocolError),

    /// A durable flush didn't finish in time. The write may still land,
    /// but the caller must treat it as not persisted.
    #[error("durable write did not finish within {0:?}")]
    Timeout(Duration),

    /// No record exists for this uuid.
    #[error("no player record for uuid {0}")]
    UnknownPlayer(PlayerUuid),

    /// The player is already bound to a different live connection.
    #[error("player {uuid} is already bound to {connection}")]
    AlreadyBound {
        uuid: PlayerUuid,
        connection: ConnectionId,
    },
}

impl StoreError {
    /// Returns `true` for the failures that mean "the disk didn't take it".
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Codec(_) | Self::Timeout(_))
    }
}
