//! `SessionRegistry`: ties live connections to durable player records.
//!
//! The registry owns two pieces of shared state:
//!
//! - the **connection table**, mapping each live [`ConnectionId`] to its
//!   connection handle, handshake state, and bound player (if any);
//! - the **stores** ([`PlayerStore`] and [`PlanetStore`]) behind one async
//!   mutex, held across the durable flush so that a get-check-insert never
//!   interleaves with another for the same key.
//!
//! The two locks are never held at the same time. Binding a player and
//! recording that binding in the connection table happen on the same
//! detached task, so every bound player is reachable from the table.
//!
//! Player records only remember the *id* of the connection they're bound
//! to. The handle itself lives in the connection table and is dropped on
//! teardown.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use starport_protocol::{
    ClientConnect, Codec, ConnectResponse, JsonCodec, PlayerUuid, ProtocolEvent, WorldStart,
};
use starport_store::{
    Database, Planet, PlanetStore, Player, PlayerDefaults, PlayerStore, Role, StoreError,
};
use starport_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::Mutex;

use crate::command::KICK;
use crate::{ConnectionState, HandshakeEvent, KickOutcome, RegistryConfig, SessionError};

/// Where a player ended up after a world start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Planet(Planet),
    Ship,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planet(planet) => write!(f, "{planet}"),
            Self::Ship => f.write_str("on ship"),
        }
    }
}

struct Stores<K: Codec> {
    players: PlayerStore<K>,
    planets: PlanetStore<K>,
}

type SharedStores<K> = Arc<Mutex<Option<Stores<K>>>>;
type ConnectionTable<C> = Arc<Mutex<HashMap<ConnectionId, ConnectionSlot<C>>>>;

/// One live connection in the table.
struct ConnectionSlot<C> {
    conn: Arc<C>,
    state: Option<ConnectionState>,
    player: Option<PlayerUuid>,
}

impl<C> ConnectionSlot<C> {
    fn new(conn: Arc<C>) -> Self {
        Self {
            conn,
            state: None,
            player: None,
        }
    }
}

/// Orchestrates the handshake state machine and the player/planet stores.
///
/// # Ordering
///
/// Events for one connection must be delivered in arrival order, and each
/// handler must be awaited before the next event for that connection is
/// passed in. In particular [`on_client_connect`](Self::on_client_connect)
/// suspends while a new record is flushed to disk; nothing else for that
/// connection may be dispatched until it returns. Events for *different*
/// connections may interleave freely.
///
/// `K` is the record format on disk, JSON unless opened
/// [`with_codec`](Self::with_codec).
pub struct SessionRegistry<C: Connection, K: Codec = JsonCodec> {
    config: RegistryConfig,
    stores: SharedStores<K>,
    connections: ConnectionTable<C>,
}

impl<C: Connection> SessionRegistry<C> {
    /// Opens the player database named in `config` and loads both stores.
    pub fn open(config: RegistryConfig) -> Result<Self, SessionError> {
        Self::with_codec(config, JsonCodec)
    }
}

impl<C: Connection, K: Codec + Clone> SessionRegistry<C, K> {
    /// Like [`open`](SessionRegistry::open), storing records with `codec`.
    pub fn with_codec(config: RegistryConfig, codec: K) -> Result<Self, SessionError> {
        let db = Database::open(&config.player_db, config.store_timeout())?;
        let owner = config.owner_uuid.clone().map(PlayerUuid::new);
        let players = PlayerStore::with_codec(db.clone(), owner, codec.clone())?;
        let planets = PlanetStore::with_codec(db, codec)?;

        tracing::info!(
            path = %config.player_db.display(),
            policy = ?config.transition_policy,
            "session registry opened"
        );

        Ok(Self {
            config,
            stores: Arc::new(Mutex::new(Some(Stores { players, planets }))),
            connections: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Handshake events
    // -----------------------------------------------------------------------

    /// The server announced its protocol version. Registers the connection.
    pub async fn on_protocol_version(
        &self,
        conn: &Arc<C>,
    ) -> Result<ConnectionState, SessionError> {
        self.advance(conn, HandshakeEvent::ProtocolVersion).await
    }

    /// The client identified itself.
    ///
    /// Looks the player up by uuid (creating and flushing a new record on
    /// first sight), binds it to `conn`, and marks it logged in. The
    /// connection only moves to `ClientConnectReceived` once all of that
    /// succeeded.
    ///
    /// The store work and the connection table update run together on a
    /// detached task, so dropping this future never leaves a player bound
    /// to a connection the table doesn't know about. The caller must still
    /// await it before dispatching the connection's next event.
    ///
    /// If the connection was already bound to a *different* player (a
    /// replayed client connect under the permissive policy), that player is
    /// released first.
    ///
    /// # Errors
    /// - [`SessionError::MalformedPayload`] if the payload has no uuid
    /// - [`SessionError::Store`] if the record can't be stored, or the
    ///   player is already bound to another connection
    /// - [`SessionError::InvalidTransition`] under the strict policy
    pub async fn on_client_connect(
        &self,
        conn: &Arc<C>,
        payload: &ClientConnect,
    ) -> Result<Player, SessionError> {
        let uuid = payload.player_uuid()?;
        let conn_id = conn.id();

        {
            let mut connections = self.connections.lock().await;
            let slot = connections
                .entry(conn_id)
                .or_insert_with(|| ConnectionSlot::new(Arc::clone(conn)));
            self.config
                .transition_policy
                .check(slot.state, HandshakeEvent::ClientConnect)?;
        }

        let defaults = PlayerDefaults::from(payload);
        let stores = Arc::clone(&self.stores);
        let connections = Arc::clone(&self.connections);
        let task_uuid = uuid.clone();
        let player = detached(async move {
            let player = {
                let mut guard = stores.lock().await;
                let stores = guard.as_mut().ok_or(SessionError::ShutDown)?;
                stores
                    .players
                    .get_or_create(&task_uuid, defaults.clone())
                    .await?;
                stores.players.bind(&task_uuid, conn_id, &defaults)?.clone()
            };

            let recorded = connections.lock().await.get_mut(&conn_id).map(|slot| {
                slot.state = Some(HandshakeEvent::ClientConnect.target());
                slot.player.replace(task_uuid.clone())
            });

            match recorded {
                Some(previous) => {
                    if let Some(previous) = previous.filter(|previous| *previous != task_uuid) {
                        tracing::warn!(%conn_id, %previous, uuid = %task_uuid, "connection switched players");
                        release(&stores, &previous, conn_id).await?;
                    }
                    Ok::<_, SessionError>(player)
                }
                None => {
                    // Torn down while the store was busy.
                    release(&stores, &task_uuid, conn_id).await?;
                    Err(TransportError::ConnectionClosed(conn_id.to_string()).into())
                }
            }
        })
        .await?;

        tracing::info!(%conn_id, %uuid, name = %player.name, "player bound to connection");
        Ok(player)
    }

    pub async fn on_handshake_challenge(
        &self,
        conn: &Arc<C>,
    ) -> Result<ConnectionState, SessionError> {
        self.advance(conn, HandshakeEvent::HandshakeChallenge).await
    }

    pub async fn on_handshake_response(
        &self,
        conn: &Arc<C>,
    ) -> Result<ConnectionState, SessionError> {
        self.advance(conn, HandshakeEvent::HandshakeResponse).await
    }

    /// The server answered the connect request.
    ///
    /// On success the player keeps its binding and takes the server's
    /// client id. On refusal it is marked logged out with client id `-1`
    /// and the connection never reaches `Connected`.
    ///
    /// The state only moves once the record is written.
    ///
    /// # Errors
    /// - [`SessionError::NoPlayerBound`] if no client connect came first
    /// - [`SessionError::InvalidTransition`] under the strict policy
    /// - [`SessionError::Store`] if the record can't be written
    pub async fn on_connect_response(
        &self,
        conn: &Arc<C>,
        response: ConnectResponse,
    ) -> Result<Player, SessionError> {
        let event = if response.success {
            HandshakeEvent::ConnectSuccess
        } else {
            HandshakeEvent::ConnectFailure
        };
        let uuid = self.bound_player(conn.id()).await?;
        let state = self.next_state(conn, event).await?;

        let player = self
            .with_stores(|stores| {
                let player = if response.success {
                    stores.players.mark_connected(&uuid, response.client_id)?
                } else {
                    stores.players.mark_refused(&uuid)?
                };
                Ok(player.clone())
            })
            .await?;
        self.enter_state(conn.id(), state).await;

        if response.success {
            tracing::info!(conn_id = %conn.id(), %uuid, client_id = response.client_id, %state, "connection accepted");
        } else {
            tracing::warn!(conn_id = %conn.id(), %uuid, %state, "connection refused by server");
        }
        Ok(player)
    }

    pub async fn on_heartbeat(&self, conn: &Arc<C>) -> Result<ConnectionState, SessionError> {
        self.advance(conn, HandshakeEvent::Heartbeat).await
    }

    // -----------------------------------------------------------------------
    // Gameplay events
    // -----------------------------------------------------------------------

    /// The client entered a world.
    ///
    /// A world with celestial coordinates is a planet: it is stored (once)
    /// and its key recorded on the player. A world without them is the
    /// player's ship.
    pub async fn on_world_start(
        &self,
        conn: &Arc<C>,
        payload: &WorldStart,
    ) -> Result<Location, SessionError> {
        let uuid = self.bound_player(conn.id()).await?;
        let coordinate = payload.coordinate().cloned();
        let stores = Arc::clone(&self.stores);
        let task_uuid = uuid.clone();

        let location = detached(async move {
            let mut guard = stores.lock().await;
            let stores = guard.as_mut().ok_or(SessionError::ShutDown)?;
            match coordinate {
                Some(coordinate) => {
                    let planet = stores
                        .planets
                        .get_or_create(
                            &coordinate.sector,
                            coordinate.location,
                            coordinate.planet,
                            coordinate.satellite,
                        )
                        .await?
                        .clone();
                    stores.players.enter_planet(&task_uuid, &planet)?;
                    Ok::<_, SessionError>(Location::Planet(planet))
                }
                None => {
                    stores.players.board_ship(&task_uuid)?;
                    Ok(Location::Ship)
                }
            }
        })
        .await?;

        tracing::info!(%uuid, %location, "player location");
        Ok(location)
    }

    /// Warp requests pass through untouched.
    pub async fn on_warp_command(&self, conn: &Arc<C>) -> Result<(), SessionError> {
        tracing::trace!(conn_id = %conn.id(), "warp command passed through");
        Ok(())
    }

    /// Client or server closed the connection.
    ///
    /// Drops the connection's state and releases its player. Calling this
    /// for a connection that is already gone does nothing.
    pub async fn on_disconnect(&self, conn_id: ConnectionId) -> Result<(), SessionError> {
        let slot = self.connections.lock().await.remove(&conn_id);
        let Some(slot) = slot else {
            tracing::trace!(%conn_id, "disconnect for unknown connection ignored");
            return Ok(());
        };

        tracing::debug!(%conn_id, state = ?slot.state, "connection torn down");
        match slot.player {
            Some(uuid) => release(&self.stores, &uuid, conn_id).await,
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Kicks the logged-in player called `target_name`.
    ///
    /// The caller must already have checked that `issuer` holds the
    /// [`KICK`](crate::command::KICK) role; this method doesn't re-check.
    ///
    /// If the player is found, their connection is closed and torn down
    /// and every connection hears about it. Otherwise only `issuer` is
    /// told.
    pub async fn kick(&self, issuer: &C, target_name: &str) -> Result<KickOutcome, SessionError> {
        let target = self
            .with_stores(|stores| Ok(stores.players.find_by_name(target_name, true).cloned()))
            .await?;

        let handle = match target.as_ref().and_then(|player| player.connection) {
            Some(conn_id) => self
                .connections
                .lock()
                .await
                .get(&conn_id)
                .map(|slot| Arc::clone(&slot.conn)),
            None => None,
        };

        let (Some(target), Some(handle)) = (target, handle) else {
            issuer
                .send_message(&format!("Couldn't find a player with name {target_name}"))
                .await?;
            tracing::debug!(issuer = %issuer.id(), target_name, "kick target not found");
            return Ok(KickOutcome::NotFound);
        };

        if let Err(e) = handle.disconnect().await {
            tracing::warn!(conn_id = %handle.id(), error = %e, "kicked connection failed to close");
        }
        self.on_disconnect(handle.id()).await?;

        let issuer_name = self
            .player_for(issuer.id())
            .await
            .map(|player| player.name)
            .unwrap_or_else(|| issuer.id().to_string());
        self.broadcast(&format!("{issuer_name} has kicked {}.", target.name))
            .await;

        tracing::info!(issuer = %issuer_name, target = %target.name, command = KICK.name, "player kicked");
        Ok(KickOutcome::Kicked { name: target.name })
    }

    /// Sends `text` to every live connection. Returns how many took it.
    pub async fn broadcast(&self, text: &str) -> usize {
        let handles: Vec<Arc<C>> = self
            .connections
            .lock()
            .await
            .values()
            .map(|slot| Arc::clone(&slot.conn))
            .collect();

        let results = join_all(handles.iter().map(|conn| conn.send_message(text))).await;

        let mut delivered = 0;
        for (conn, result) in handles.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(conn_id = %conn.id(), error = %e, "broadcast send failed"),
            }
        }
        delivered
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Logs every player out, flushes the database, and releases it.
    ///
    /// Call once, at process exit. Every later call, and every store
    /// operation after this, fails with [`SessionError::ShutDown`].
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let taken = self.stores.lock().await.take();
        let Some(mut stores) = taken else {
            tracing::error!("session registry shut down twice");
            return Err(SessionError::ShutDown);
        };
        self.connections.lock().await.clear();

        detached(async move {
            let released = stores.players.release_all().await;
            if let Err(e) = &released {
                tracing::error!(error = %e, "player release on shutdown failed");
            }
            drop(stores);
            Ok::<_, SessionError>(released?)
        })
        .await?;

        tracing::info!("session registry shut down");
        Ok(())
    }

    /// Routes one parsed event to its handler.
    ///
    /// If a handshake event fails, or any event is out of order under the
    /// strict policy, the connection is rejected: it is sent a short
    /// reason, closed, and torn down. The error is returned either way.
    pub async fn dispatch(&self, conn: &Arc<C>, event: ProtocolEvent) -> Result<(), SessionError> {
        let handshake = is_handshake(&event);
        tracing::trace!(conn_id = %conn.id(), event = event.name(), "dispatching event");

        let result = match event {
            ProtocolEvent::ProtocolVersion => self.on_protocol_version(conn).await.map(drop),
            ProtocolEvent::ClientConnect(payload) => {
                self.on_client_connect(conn, &payload).await.map(drop)
            }
            ProtocolEvent::HandshakeChallenge => self.on_handshake_challenge(conn).await.map(drop),
            ProtocolEvent::HandshakeResponse => self.on_handshake_response(conn).await.map(drop),
            ProtocolEvent::ConnectResponse(response) => {
                self.on_connect_response(conn, response).await.map(drop)
            }
            ProtocolEvent::Heartbeat => self.on_heartbeat(conn).await.map(drop),
            ProtocolEvent::WorldStart(payload) => self.on_world_start(conn, &payload).await.map(drop),
            ProtocolEvent::WarpCommand => self.on_warp_command(conn).await,
            ProtocolEvent::ClientDisconnect | ProtocolEvent::ServerDisconnect => {
                self.on_disconnect(conn.id()).await
            }
        };

        if let Err(e) = &result {
            if handshake || matches!(e, SessionError::InvalidTransition { .. }) {
                self.reject(conn, e).await;
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Queries and moderation
    // -----------------------------------------------------------------------

    pub async fn player(&self, uuid: &PlayerUuid) -> Option<Player> {
        self.with_stores(|stores| Ok(stores.players.get(uuid).cloned()))
            .await
            .ok()
            .flatten()
    }

    /// The player bound to `conn_id`, if the connection got that far.
    pub async fn player_for(&self, conn_id: ConnectionId) -> Option<Player> {
        let uuid = self.bound_player(conn_id).await.ok()?;
        self.player(&uuid).await
    }

    pub async fn find_by_name(&self, name: &str, only_logged_in: bool) -> Option<Player> {
        self.with_stores(|stores| Ok(stores.players.find_by_name(name, only_logged_in).cloned()))
            .await
            .ok()
            .flatten()
    }

    /// Snapshot of every stored player.
    pub async fn players(&self) -> Result<Vec<Player>, SessionError> {
        self.with_stores(|stores| Ok(stores.players.all())).await
    }

    /// Snapshot of every stored planet.
    pub async fn planets(&self) -> Result<Vec<Planet>, SessionError> {
        self.with_stores(|stores| Ok(stores.planets.all())).await
    }

    pub async fn state(&self, conn_id: ConnectionId) -> Option<ConnectionState> {
        self.connections
            .lock()
            .await
            .get(&conn_id)
            .and_then(|slot| slot.state)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn add_role(&self, uuid: &PlayerUuid, role: Role) -> Result<Player, SessionError> {
        self.with_stores(|stores| Ok(stores.players.add_role(uuid, role)?.clone()))
            .await
    }

    pub async fn set_muted(&self, uuid: &PlayerUuid, muted: bool) -> Result<Player, SessionError> {
        self.with_stores(|stores| Ok(stores.players.set_muted(uuid, muted)?.clone()))
            .await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Applies `event` to the connection's state, registering it if new.
    async fn advance(
        &self,
        conn: &Arc<C>,
        event: HandshakeEvent,
    ) -> Result<ConnectionState, SessionError> {
        let conn_id = conn.id();
        let mut connections = self.connections.lock().await;
        let slot = connections
            .entry(conn_id)
            .or_insert_with(|| ConnectionSlot::new(Arc::clone(conn)));
        let next = self.config.transition_policy.apply(slot.state, event)?;
        slot.state = Some(next);
        tracing::debug!(%conn_id, ?event, state = %next, "connection state advanced");
        Ok(next)
    }

    /// The state `event` would move the connection to, without moving it.
    async fn next_state(
        &self,
        conn: &Arc<C>,
        event: HandshakeEvent,
    ) -> Result<ConnectionState, SessionError> {
        let mut connections = self.connections.lock().await;
        let slot = connections
            .entry(conn.id())
            .or_insert_with(|| ConnectionSlot::new(Arc::clone(conn)));
        self.config.transition_policy.apply(slot.state, event)
    }

    /// Sets the connection's state if it is still in the table.
    async fn enter_state(&self, conn_id: ConnectionId, state: ConnectionState) {
        if let Some(slot) = self.connections.lock().await.get_mut(&conn_id) {
            slot.state = Some(state);
            tracing::debug!(%conn_id, %state, "connection state advanced");
        }
    }

    async fn bound_player(&self, conn_id: ConnectionId) -> Result<PlayerUuid, SessionError> {
        self.connections
            .lock()
            .await
            .get(&conn_id)
            .and_then(|slot| slot.player.clone())
            .ok_or(SessionError::NoPlayerBound(conn_id))
    }

    /// Runs synchronous bookkeeping against the stores.
    async fn with_stores<T>(
        &self,
        f: impl FnOnce(&mut Stores<K>) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut guard = self.stores.lock().await;
        let stores = guard.as_mut().ok_or(SessionError::ShutDown)?;
        f(stores)
    }

    async fn reject(&self, conn: &Arc<C>, reason: &SessionError) {
        let conn_id = conn.id();
        tracing::warn!(%conn_id, error = %reason, "connection rejected");

        if let Err(e) = conn.send_message(&format!("connection rejected: {reason}")).await {
            tracing::debug!(%conn_id, error = %e, "could not send rejection");
        }
        if let Err(e) = conn.disconnect().await {
            tracing::debug!(%conn_id, error = %e, "could not close rejected connection");
        }
        if let Err(e) = self.on_disconnect(conn_id).await {
            tracing::error!(%conn_id, error = %e, "teardown after rejection failed");
        }
    }
}

/// Unbinds `uuid` from `conn_id`. A no-op once the stores are released.
async fn release<K: Codec>(
    stores: &Mutex<Option<Stores<K>>>,
    uuid: &PlayerUuid,
    conn_id: ConnectionId,
) -> Result<(), SessionError> {
    let mut guard = stores.lock().await;
    let Some(stores) = guard.as_mut() else {
        return Ok(());
    };
    match stores.players.unbind(uuid, conn_id) {
        Ok(_) => {
            tracing::info!(%conn_id, %uuid, "player released");
            Ok(())
        }
        Err(StoreError::UnknownPlayer(_)) => Ok(()),
        Err(e) => {
            tracing::error!(%conn_id, %uuid, error = %e, "failed to persist player release");
            Err(e.into())
        }
    }
}

/// Runs `task` on its own Tokio task and waits for it.
///
/// Dropping the returned future doesn't cancel `task`, so store writes
/// that have started always finish.
async fn detached<T, F>(task: F) -> Result<T, SessionError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SessionError>> + Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|e| SessionError::Task(e.to_string()))?
}

fn is_handshake(event: &ProtocolEvent) -> bool {
    matches!(
        event,
        ProtocolEvent::ProtocolVersion
            | ProtocolEvent::ClientConnect(_)
            | ProtocolEvent::HandshakeChallenge
            | ProtocolEvent::HandshakeResponse
            | ProtocolEvent::ConnectResponse(_)
    )
}
