//! Parsed event types handed to the session registry.
//!
//! The packet layer does the hard work of framing and parsing game
//! traffic. What reaches us is one of these structures, one per protocol
//! event the registry cares about. Most events are pure triggers; only
//! client connect, connect response, and world start carry data.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The stable identifier a game client presents when it connects.
///
/// Clients send their uuid as raw ASCII bytes. We keep it as a `String`
/// because it's the primary key of the player namespace and gets compared
/// against the configured owner uuid.
///
/// `#[serde(transparent)]` makes it serialize as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerUuid(String);

impl PlayerUuid {
    /// Wraps an already-decoded uuid string.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self(uuid.into())
    }

    /// Decodes the raw bytes a client sent.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MalformedPayload`] if the bytes are empty
    /// or not ASCII.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.is_empty() {
            return Err(ProtocolError::MalformedPayload("uuid is empty".into()));
        }
        if !bytes.is_ascii() {
            return Err(ProtocolError::MalformedPayload(
                "uuid is not ascii".into(),
            ));
        }
        // ASCII is always valid UTF-8, so this can't fail after the check.
        let text = String::from_utf8_lossy(bytes).into_owned();
        Ok(Self(text))
    }

    /// Returns the uuid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Client connect
// ---------------------------------------------------------------------------

/// The identity a client announces in its connect request.
///
/// Only `uuid` is required; every other field is a default for a player
/// record that doesn't exist yet. The field is still an `Option` so a
/// payload without it decodes and can be rejected with a clear
/// [`ProtocolError::MalformedPayload`] instead of a generic decode error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConnect {
    pub uuid: Option<Vec<u8>>,
    pub name: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub roles: Option<BTreeSet<String>>,
    pub logged_in: Option<bool>,
    pub client_id: Option<i32>,
    pub ip: Option<String>,
    pub planet: Option<String>,
    pub on_ship: Option<bool>,
    pub muted: Option<bool>,
}

impl ClientConnect {
    /// Extracts the client's uuid.
    ///
    /// # Errors
    /// [`ProtocolError::MalformedPayload`] if the uuid is missing or
    /// unusable.
    pub fn player_uuid(&self) -> Result<PlayerUuid, ProtocolError> {
        let bytes = self.uuid.as_deref().ok_or_else(|| {
            ProtocolError::MalformedPayload("client connect is missing uuid".into())
        })?;
        PlayerUuid::from_bytes(bytes)
    }
}

// ---------------------------------------------------------------------------
// Connect response
// ---------------------------------------------------------------------------

/// The server's answer to a connect request, observed on its way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub success: bool,
    /// Session id the server assigned. Meaningless when `success` is false.
    pub client_id: i32,
}

// ---------------------------------------------------------------------------
// World start
// ---------------------------------------------------------------------------

/// Sent when a client enters a world: a planet or its own ship.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorldStart {
    pub planet: WorldPlanet,
}

impl WorldStart {
    /// Returns the celestial coordinate, or `None` when the world is a ship.
    pub fn coordinate(&self) -> Option<&CelestialCoordinate> {
        self.planet
            .celestial_parameters
            .as_ref()
            .map(|params| &params.coordinate)
    }
}

/// World description inside a [`WorldStart`].
///
/// The game spells this field in camelCase, so we rename it to keep the
/// Rust side snake_case.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorldPlanet {
    #[serde(rename = "celestialParameters", default)]
    pub celestial_parameters: Option<CelestialParameters>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CelestialParameters {
    pub coordinate: CelestialCoordinate,
}

/// Where in the universe a planet sits.
///
/// `location` is the `(a, x, y)` triple; `planet` and `satellite` pick the
/// body inside that system (satellite 0 is the planet itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CelestialCoordinate {
    pub sector: String,
    pub location: (i32, i32, i32),
    pub planet: i32,
    pub satellite: i32,
}

// ---------------------------------------------------------------------------
// ProtocolEvent
// ---------------------------------------------------------------------------

/// Every protocol event the session registry reacts to.
///
/// `#[serde(tag = "type")]` gives internally tagged JSON, so a heartbeat is
/// `{"type":"Heartbeat"}` and a connect response is
/// `{"type":"ConnectResponse","success":true,"client_id":3}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolEvent {
    /// Server → client: protocol version announced. First event on a connection.
    ProtocolVersion,

    /// Client → server: "this is who I am".
    ClientConnect(ClientConnect),

    /// Server → client: password challenge. Only sent when the server has one.
    HandshakeChallenge,

    /// Client → server: answer to the challenge.
    HandshakeResponse,

    /// Server → client: accepted or refused.
    ConnectResponse(ConnectResponse),

    /// Keep-alive after the handshake.
    Heartbeat,

    /// Server → client: the client entered a world.
    WorldStart(WorldStart),

    /// Client → server: warp request. Passed through untouched.
    WarpCommand,

    /// The client closed the connection.
    ClientDisconnect,

    /// The server closed the connection.
    ServerDisconnect,
}

impl ProtocolEvent {
    /// A short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProtocolVersion => "protocol_version",
            Self::ClientConnect(_) => "client_connect",
            Self::HandshakeChallenge => "handshake_challenge",
            Self::HandshakeResponse => "handshake_response",
            Self::ConnectResponse(_) => "connect_response",
            Self::Heartbeat => "heartbeat",
            Self::WorldStart(_) => "world_start",
            Self::WarpCommand => "warp_command",
            Self::ClientDisconnect => "client_disconnect",
            Self::ServerDisconnect => "server_disconnect",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
