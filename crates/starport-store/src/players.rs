//! The player store: one durable record per client uuid.
//!
//! Records are loaded into an ordered in-memory index when the store opens
//! and written through to the `players` namespace on every change. Only
//! creation waits for a durable flush; ordinary updates are flushed in bulk
//! by [`release_all`](PlayerStore::release_all) at shutdown.

use std::collections::BTreeMap;

use chrono::Utc;
use starport_protocol::{Codec, JsonCodec, PlayerUuid};
use starport_transport::ConnectionId;

use crate::{
    Database, Planet, Player, PlayerDefaults, Role, RoleHierarchy, StoreError,
    UNBOUND_CLIENT_ID,
};

/// Deduplicated player records keyed by uuid.
///
/// The index is a `BTreeMap`, so iteration order (and therefore which
/// record wins a duplicate-name lookup) is the uuid order, same as the
/// on-disk order.
pub struct PlayerStore<K: Codec = JsonCodec> {
    db: Database,
    codec: K,
    players: BTreeMap<PlayerUuid, Player>,
    owner: Option<PlayerUuid>,
    hierarchy: RoleHierarchy,
}

impl PlayerStore<JsonCodec> {
    /// Opens the store with the default JSON record format.
    pub fn open(db: Database, owner: Option<PlayerUuid>) -> Result<Self, StoreError> {
        Self::with_codec(db, owner, JsonCodec)
    }
}

impl<K: Codec> PlayerStore<K> {
    /// Opens the store and loads every record.
    ///
    /// Nobody is connected right after opening, so loaded records come up
    /// unbound and logged out regardless of what was on disk.
    pub fn with_codec(
        db: Database,
        owner: Option<PlayerUuid>,
        codec: K,
    ) -> Result<Self, StoreError> {
        let mut players = BTreeMap::new();
        for item in db.players().iter() {
            let (_, value) = item?;
            let mut player: Player = codec.decode(&value)?;
            player.connection = None;
            player.logged_in = false;
            players.insert(player.uuid.clone(), player);
        }
        tracing::info!(count = players.len(), "loaded player records");

        Ok(Self {
            db,
            codec,
            players,
            owner,
            hierarchy: RoleHierarchy,
        })
    }

    /// Returns `true` if `uuid` is the configured owner.
    pub fn is_owner(&self, uuid: &PlayerUuid) -> bool {
        self.owner.as_ref() == Some(uuid)
    }

    /// Returns the record for `uuid`, creating it from `defaults` if needed.
    ///
    /// The owner uuid always comes back holding every role, whether the
    /// record is new or old, so a config change granting ownership applies
    /// on the next lookup.
    ///
    /// A new record is flushed to disk before this returns.
    ///
    /// # Errors
    /// A storage failure while creating. The record is then absent from
    /// both the index and the disk.
    pub async fn get_or_create(
        &mut self,
        uuid: &PlayerUuid,
        defaults: PlayerDefaults,
    ) -> Result<&Player, StoreError> {
        if self.players.contains_key(uuid) {
            tracing::debug!(%uuid, "returning existing player");
            if self.is_owner(uuid) {
                let roles = self.hierarchy.owner_roles();
                self.update(uuid, |player| player.roles = roles)?;
            }
            return self.require(uuid);
        }

        let mut player = defaults.into_player(uuid.clone());
        if self.is_owner(uuid) {
            tracing::info!(%uuid, "uuid matches owner, granting every role");
            player.roles = self.hierarchy.owner_roles();
        }

        let bytes = self.codec.encode(&player)?;
        self.db.players().insert(uuid.as_str(), bytes)?;
        if let Err(e) = self.db.flush().await {
            if let Err(undo) = self.db.players().remove(uuid.as_str()) {
                tracing::error!(%uuid, error = %undo, "failed to roll back player insert");
            }
            return Err(e);
        }

        tracing::info!(%uuid, name = %player.name, "created new player");
        self.players.insert(uuid.clone(), player);
        self.require(uuid)
    }

    /// Looks a record up by uuid.
    pub fn get(&self, uuid: &PlayerUuid) -> Option<&Player> {
        self.players.get(uuid)
    }

    /// Case-insensitive exact name match.
    ///
    /// With `only_logged_in`, logged-out records are skipped. When several
    /// records share a name, the first in uuid order wins.
    pub fn find_by_name(&self, name: &str, only_logged_in: bool) -> Option<&Player> {
        let wanted = name.to_lowercase();
        self.players
            .values()
            .filter(|player| !only_logged_in || player.logged_in)
            .find(|player| player.name.to_lowercase() == wanted)
    }

    /// A snapshot of every record, in uuid order.
    pub fn all(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    // -- Session bookkeeping ------------------------------------------------

    /// Binds a live connection to the player and marks them logged in.
    ///
    /// Refreshes `last_seen`, and `name`/`ip` when `refresh` carries them.
    ///
    /// # Errors
    /// - [`StoreError::AlreadyBound`] if another connection holds the player
    /// - a storage failure, in which case the record stays unbound
    pub fn bind(
        &mut self,
        uuid: &PlayerUuid,
        connection: ConnectionId,
        refresh: &PlayerDefaults,
    ) -> Result<&Player, StoreError> {
        let current = self.require(uuid)?.connection;
        if let Some(existing) = current.filter(|existing| *existing != connection) {
            return Err(StoreError::AlreadyBound {
                uuid: uuid.clone(),
                connection: existing,
            });
        }

        self.update(uuid, |player| {
            player.connection = Some(connection);
            player.logged_in = true;
            player.last_seen = Utc::now();
            if let Some(name) = refresh.name.as_ref().filter(|name| !name.is_empty()) {
                player.name = name.clone();
            }
            if let Some(ip) = &refresh.ip {
                player.ip = ip.clone();
            }
        })
    }

    /// The server accepted the connection and assigned `client_id`.
    pub fn mark_connected(
        &mut self,
        uuid: &PlayerUuid,
        client_id: i32,
    ) -> Result<&Player, StoreError> {
        self.update(uuid, |player| {
            player.logged_in = true;
            player.client_id = client_id;
        })
    }

    /// The server refused the connection.
    pub fn mark_refused(&mut self, uuid: &PlayerUuid) -> Result<&Player, StoreError> {
        self.update(uuid, |player| {
            player.logged_in = false;
            player.client_id = UNBOUND_CLIENT_ID;
        })
    }

    /// Clears the binding to `connection`.
    ///
    /// The in-memory record is cleared before the write is attempted, so a
    /// failing disk never leaves a player marked logged in. A record bound
    /// to a *different* connection is left alone.
    pub fn unbind(
        &mut self,
        uuid: &PlayerUuid,
        connection: ConnectionId,
    ) -> Result<&Player, StoreError> {
        let current = self.require(uuid)?.connection;
        if current.is_some_and(|existing| existing != connection) {
            tracing::debug!(%uuid, %connection, "player bound elsewhere, not unbinding");
            return self.require(uuid);
        }
        let player = self
            .players
            .get_mut(uuid)
            .ok_or_else(|| StoreError::UnknownPlayer(uuid.clone()))?;
        player.connection = None;
        player.logged_in = false;
        write_record(&self.db, &self.codec, player)?;
        Ok(&*player)
    }

    // -- Location and moderation --------------------------------------------

    /// Records that the player is now on `planet`.
    pub fn enter_planet(&mut self, uuid: &PlayerUuid, planet: &Planet) -> Result<&Player, StoreError> {
        let key = planet.key();
        self.update(uuid, |player| {
            player.planet = key;
            player.on_ship = false;
        })
    }

    /// Records that the player is now aboard their ship.
    pub fn board_ship(&mut self, uuid: &PlayerUuid) -> Result<&Player, StoreError> {
        self.update(uuid, |player| {
            player.planet.clear();
            player.on_ship = true;
        })
    }

    pub fn add_role(&mut self, uuid: &PlayerUuid, role: Role) -> Result<&Player, StoreError> {
        self.update(uuid, |player| {
            player.roles.insert(role.name().to_string());
        })
    }

    pub fn set_muted(&mut self, uuid: &PlayerUuid, muted: bool) -> Result<&Player, StoreError> {
        self.update(uuid, |player| player.muted = muted)
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Logs every player out, writes them back, and flushes the database.
    ///
    /// Used at shutdown. Every record is cleared in memory even if some
    /// writes fail; the first failure is returned after the flush attempt.
    pub async fn release_all(&mut self) -> Result<(), StoreError> {
        let mut first_error = None;
        for player in self.players.values_mut() {
            player.connection = None;
            player.logged_in = false;
            if let Err(e) = write_record(&self.db, &self.codec, player) {
                tracing::error!(uuid = %player.uuid, error = %e, "failed to write player on release");
                first_error.get_or_insert(e);
            }
        }
        let flushed = self.db.flush().await;
        match first_error {
            Some(e) => Err(e),
            None => flushed,
        }
    }

    /// Flushes pending writes.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().await
    }

    fn require(&self, uuid: &PlayerUuid) -> Result<&Player, StoreError> {
        self.players
            .get(uuid)
            .ok_or_else(|| StoreError::UnknownPlayer(uuid.clone()))
    }

    /// Applies `change` to a copy of the record and writes the copy.
    ///
    /// The index only takes the copy once the write succeeded, so a failed
    /// write leaves the record as it was.
    fn update(
        &mut self,
        uuid: &PlayerUuid,
        change: impl FnOnce(&mut Player),
    ) -> Result<&Player, StoreError> {
        let mut changed = self.require(uuid)?.clone();
        change(&mut changed);
        write_record(&self.db, &self.codec, &changed)?;
        self.players.insert(uuid.clone(), changed);
        self.require(uuid)
    }
}

fn write_record<K: Codec>(db: &Database, codec: &K, player: &Player) -> Result<(), StoreError> {
    let bytes = codec.encode(player)?;
    db.players().insert(player.uuid.as_str(), bytes)?;
    Ok(())
}
