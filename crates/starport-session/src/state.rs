//! The per-connection handshake state machine.
//!
//! A connection walks through the connect exchange in a fixed order:
//!
//! ```text
//! (none) ─ProtocolVersion→ VersionSent ─ClientConnect→ ClientConnectReceived
//!                                                        │            │
//!                                      HandshakeChallenge│            │
//!                                                        ▼            │
//!                                           HandshakeChallengeSent    │
//!                                                        │            │
//!                                       HandshakeResponse│            │
//!                                                        ▼            │
//!                                        HandshakeResponseReceived    │
//!                                                        │            │
//!                                          ConnectSuccess├────────────┤ConnectFailure
//!                                                        ▼            ▼
//!                      ConnectedWithHeartbeat ←Heartbeat─ Connected   ConnectResponseSent
//! ```
//!
//! The challenge/response pair only happens when the server has a
//! password, so a connect response may follow the client connect
//! directly.
//!
//! What happens on an out-of-order event is up to the [`TransitionPolicy`].

use std::fmt;

use serde::Deserialize;

use crate::SessionError;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// How far a connection has got. A connection with no state has not seen
/// any event yet; the state is dropped with the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    VersionSent,
    ClientConnectReceived,
    HandshakeChallengeSent,
    HandshakeResponseReceived,
    /// The server answered, but refused.
    ConnectResponseSent,
    Connected,
    ConnectedWithHeartbeat,
}

impl ConnectionState {
    /// Returns `true` once the server has accepted the connection.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::ConnectedWithHeartbeat)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VersionSent => "VersionSent",
            Self::ClientConnectReceived => "ClientConnectReceived",
            Self::HandshakeChallengeSent => "HandshakeChallengeSent",
            Self::HandshakeResponseReceived => "HandshakeResponseReceived",
            Self::ConnectResponseSent => "ConnectResponseSent",
            Self::Connected => "Connected",
            Self::ConnectedWithHeartbeat => "ConnectedWithHeartbeat",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// HandshakeEvent
// ---------------------------------------------------------------------------

/// The events that move a connection's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeEvent {
    ProtocolVersion,
    ClientConnect,
    HandshakeChallenge,
    HandshakeResponse,
    ConnectSuccess,
    ConnectFailure,
    Heartbeat,
}

impl HandshakeEvent {
    /// The state this event leads to.
    pub fn target(self) -> ConnectionState {
        match self {
            Self::ProtocolVersion => ConnectionState::VersionSent,
            Self::ClientConnect => ConnectionState::ClientConnectReceived,
            Self::HandshakeChallenge => ConnectionState::HandshakeChallengeSent,
            Self::HandshakeResponse => ConnectionState::HandshakeResponseReceived,
            Self::ConnectSuccess => ConnectionState::Connected,
            Self::ConnectFailure => ConnectionState::ConnectResponseSent,
            Self::Heartbeat => ConnectionState::ConnectedWithHeartbeat,
        }
    }

    /// Returns `true` if the event is expected while in `current`.
    pub fn admits(self, current: Option<ConnectionState>) -> bool {
        use ConnectionState::*;
        match self {
            Self::ProtocolVersion => current.is_none(),
            Self::ClientConnect => current == Some(VersionSent),
            Self::HandshakeChallenge => current == Some(ClientConnectReceived),
            Self::HandshakeResponse => current == Some(HandshakeChallengeSent),
            Self::ConnectSuccess | Self::ConnectFailure => matches!(
                current,
                Some(ClientConnectReceived | HandshakeResponseReceived)
            ),
            Self::Heartbeat => matches!(current, Some(Connected | ConnectedWithHeartbeat)),
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionPolicy
// ---------------------------------------------------------------------------

/// What to do with an event that arrives out of order.
///
/// Game clients and servers are not always tidy about the handshake, so
/// the default is to log and carry on. `Strict` turns an out-of-order
/// event into a rejected connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Apply the event's target state anyway, with a warning.
    #[default]
    Permissive,
    /// Refuse with [`SessionError::InvalidTransition`].
    Strict,
}

impl TransitionPolicy {
    /// Checks `event` against `current` without changing anything.
    ///
    /// # Errors
    /// [`SessionError::InvalidTransition`] under `Strict` when the event
    /// isn't admitted.
    pub fn check(
        self,
        current: Option<ConnectionState>,
        event: HandshakeEvent,
    ) -> Result<(), SessionError> {
        if event.admits(current) {
            return Ok(());
        }
        match self {
            Self::Permissive => {
                tracing::warn!(?current, ?event, "out-of-order handshake event accepted");
                Ok(())
            }
            Self::Strict => Err(SessionError::InvalidTransition {
                from: current,
                event,
            }),
        }
    }

    /// Checks `event` and returns the state to move to.
    pub fn apply(
        self,
        current: Option<ConnectionState>,
        event: HandshakeEvent,
    ) -> Result<ConnectionState, SessionError> {
        self.check(current, event)?;
        Ok(event.target())
    }
}
