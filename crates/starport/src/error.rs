//! Unified error type for Starport.

use starport_protocol::ProtocolError;
use starport_session::SessionError;
use starport_store::StoreError;
use starport_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// With the `starport` meta crate you deal with this one type; `?`
/// converts the layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum StarportError {
    /// Talking to a connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame couldn't be decoded into an event.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The player database failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A handler refused an event.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl StarportError {
    /// Returns `true` when durable storage didn't take a write, whichever
    /// layer reported it.
    pub fn is_storage_failure(&self) -> bool {
        match self {
            Self::Store(e) => e.is_storage_failure(),
            Self::Session(e) => e.is_storage_failure(),
            Self::Transport(_) | Self::Protocol(_) => false,
        }
    }
}
