//! Error types for the session layer.

use starport_protocol::ProtocolError;
use starport_store::StoreError;
use starport_transport::{ConnectionId, TransportError};

use crate::{ConnectionState, HandshakeEvent};

/// Errors that can occur while handling a connection's events.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The store refused the operation. See [`StoreError::is_storage_failure`].
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A required field is missing from an event payload.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// An event arrived in a state that doesn't admit it, under the strict
    /// transition policy.
    #[error("{event:?} is not valid in state {from:?}")]
    InvalidTransition {
        from: Option<ConnectionState>,
        event: HandshakeEvent,
    },

    /// The event needs a player, but the connection never completed a
    /// client connect.
    #[error("no player bound to {0}")]
    NoPlayerBound(ConnectionId),

    /// Talking to a connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A detached store task panicked or was aborted.
    #[error("store task failed: {0}")]
    Task(String),

    /// The registry has been shut down and its store released.
    #[error("session registry has been shut down")]
    ShutDown,
}

impl SessionError {
    /// Returns `true` when durable storage didn't take a write.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_storage_failure())
    }

    /// Returns `true` for the payload-shaped failures that are fatal to a
    /// handshake.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedPayload(_) | Self::InvalidTransition { .. }
        )
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedPayload(reason) => Self::MalformedPayload(reason),
            other => Self::MalformedPayload(other.to_string()),
        }
    }
}
