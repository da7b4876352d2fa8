//! The player record and the defaults a new one is built from.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starport_protocol::{ClientConnect, PlayerUuid};
use starport_transport::ConnectionId;

/// `client_id` of a player with no server-assigned session.
pub const UNBOUND_CLIENT_ID: i32 = -1;

/// Address recorded when a client's ip is unknown.
pub const DEFAULT_IP: &str = "0.0.0.0";

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Everything the proxy remembers about one client identity.
///
/// Created the first time a uuid completes a client connect, then mutated
/// on reconnects, location changes, and moderation. Never deleted.
///
/// `connection` is a lookup handle, not the connection itself, and is
/// never persisted: after a restart nobody is connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Primary key. Never changes after creation.
    pub uuid: PlayerUuid,

    /// Display name. Not unique.
    pub name: String,

    pub last_seen: DateTime<Utc>,

    /// Role names. Resolved against the hierarchy only when needed.
    pub roles: BTreeSet<String>,

    /// True only while a live connection is bound.
    pub logged_in: bool,

    #[serde(skip)]
    pub connection: Option<ConnectionId>,

    /// Server-assigned session id, [`UNBOUND_CLIENT_ID`] when unbound.
    pub client_id: i32,

    pub ip: String,

    /// Canonical key of the current planet, empty while on a ship.
    pub planet: String,

    pub on_ship: bool,

    pub muted: bool,
}

impl Player {
    /// Returns `true` if a live connection is bound to this player.
    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles: Vec<&str> = self.roles.iter().map(String::as_str).collect();
        let connection = self
            .connection
            .map_or_else(|| "none".to_string(), |id| id.to_string());
        writeln!(f, "uuid:       {}", self.uuid)?;
        writeln!(f, "name:       {}", self.name)?;
        writeln!(f, "last_seen:  {}", self.last_seen.to_rfc3339())?;
        writeln!(f, "roles:      [{}]", roles.join(", "))?;
        writeln!(f, "logged_in:  {}", self.logged_in)?;
        writeln!(f, "connection: {connection}")?;
        writeln!(f, "client_id:  {}", self.client_id)?;
        writeln!(f, "ip:         {}", self.ip)?;
        writeln!(f, "planet:     {}", self.planet)?;
        writeln!(f, "on_ship:    {}", self.on_ship)?;
        write!(f, "muted:      {}", self.muted)
    }
}

// ---------------------------------------------------------------------------
// PlayerDefaults
// ---------------------------------------------------------------------------

/// Optional starting values for a player that doesn't exist yet.
///
/// Every field falls back to a fixed default when absent; see
/// [`into_player`](Self::into_player).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerDefaults {
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

impl PlayerDefaults {
    /// Defaults carrying only a display name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Builds a fresh record for `uuid`.
    ///
    /// Fallbacks: empty name, `last_seen` = now, no roles, logged in,
    /// unbound client id, [`DEFAULT_IP`], no planet, on ship, not muted.
    pub fn into_player(self, uuid: PlayerUuid) -> Player {
        Player {
            uuid,
            name: self.name.unwrap_or_default(),
            last_seen: self.last_seen.unwrap_or_else(Utc::now),
            roles: self.roles.unwrap_or_default(),
            logged_in: self.logged_in.unwrap_or(true),
            connection: None,
            client_id: self.client_id.unwrap_or(UNBOUND_CLIENT_ID),
            ip: self.ip.unwrap_or_else(|| DEFAULT_IP.to_string()),
            planet: self.planet.unwrap_or_default(),
            on_ship: self.on_ship.unwrap_or(true),
            muted: self.muted.unwrap_or(false),
        }
    }
}

impl From<&ClientConnect> for PlayerDefaults {
    fn from(connect: &ClientConnect) -> Self {
        Self {
            name: connect.name.clone(),
            last_seen: connect.last_seen,
            roles: connect.roles.clone(),
            logged_in: connect.logged_in,
            client_id: connect.client_id,
            ip: connect.ip.clone(),
            planet: connect.planet.clone(),
            on_ship: connect.on_ship,
            muted: connect.muted,
        }
    }
}
