//! Integration tests for the session registry: handshake lifecycle, kick,
//! shutdown, and concurrent access to the shared stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use starport_protocol::{
    CelestialCoordinate, CelestialParameters, ClientConnect, Codec, ConnectResponse, JsonCodec,
    PlayerUuid, ProtocolError, ProtocolEvent, WorldPlanet, WorldStart,
};
use starport_session::{
    ConnectionState, KickOutcome, Location, RegistryConfig, SessionError, SessionRegistry,
    TransitionPolicy,
};
use starport_store::{Role, StoreError, UNBOUND_CLIENT_ID};
use starport_transport::{Connection, LoopbackConnection, LoopbackPeer, Outbound};
use tempfile::TempDir;

type Registry = SessionRegistry<LoopbackConnection>;

// =========================================================================
// Helpers
// =========================================================================

fn config(dir: &TempDir) -> RegistryConfig {
    RegistryConfig {
        player_db: dir.path().join("player_db"),
        ..RegistryConfig::default()
    }
}

fn open_registry(dir: &TempDir) -> Registry {
    SessionRegistry::open(config(dir)).unwrap()
}

fn connection() -> (Arc<LoopbackConnection>, LoopbackPeer) {
    let (conn, peer) = LoopbackConnection::pair();
    (Arc::new(conn), peer)
}

fn connect_payload(uuid: &str, name: &str) -> ClientConnect {
    ClientConnect {
        uuid: Some(uuid.as_bytes().to_vec()),
        name: Some(name.to_string()),
        ..ClientConnect::default()
    }
}

fn world_at(sector: &str, location: (i32, i32, i32), planet: i32, satellite: i32) -> WorldStart {
    WorldStart {
        planet: WorldPlanet {
            celestial_parameters: Some(CelestialParameters {
                coordinate: CelestialCoordinate {
                    sector: sector.to_string(),
                    location,
                    planet,
                    satellite,
                },
            }),
        },
    }
}

/// JSON record codec that fails every encode once its allowance is spent.
#[derive(Clone)]
struct RationedCodec {
    remaining: Arc<AtomicUsize>,
}

impl RationedCodec {
    fn new(encodes: usize) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(encodes)),
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

fn open_rationed(
    dir: &TempDir,
    encodes: usize,
) -> SessionRegistry<LoopbackConnection, RationedCodec> {
    SessionRegistry::with_codec(config(dir), RationedCodec::new(encodes)).unwrap()
}

/// Waits until `uuid` exists and is logged out and unbound.
async fn wait_released(registry: &Registry, uuid: &PlayerUuid) {
    for _ in 0..50 {
        if let Some(player) = registry.player(uuid).await {
            if !player.logged_in && player.connection.is_none() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{uuid} was never released");
}

/// Runs a full successful handshake for `uuid`.
async fn join(
    registry: &Registry,
    uuid: &str,
    name: &str,
) -> (Arc<LoopbackConnection>, LoopbackPeer) {
    let (conn, peer) = connection();
    registry.on_protocol_version(&conn).await.unwrap();
    registry
        .on_client_connect(&conn, &connect_payload(uuid, name))
        .await
        .unwrap();
    registry
        .on_connect_response(
            &conn,
            ConnectResponse {
                success: true,
                client_id: 7,
            },
        )
        .await
        .unwrap();
    (conn, peer)
}

// =========================================================================
// Connect lifecycle
// =========================================================================

#[tokio::test]
async fn test_client_connect_binds_player_and_disconnect_releases_it() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = connection();
    let uuid = PlayerUuid::new("u-alice");

    registry.on_protocol_version(&conn).await.unwrap();
    let player = registry
        .on_client_connect(&conn, &connect_payload("u-alice", "Alice"))
        .await
        .unwrap();

    assert!(player.logged_in);
    assert_eq!(player.connection, Some(conn.id()));
    assert_eq!(
        registry.state(conn.id()).await,
        Some(ConnectionState::ClientConnectReceived)
    );

    registry.add_role(&uuid, Role::Moderator).await.unwrap();
    registry.on_disconnect(conn.id()).await.unwrap();

    let player = registry.player(&uuid).await.unwrap();
    assert!(!player.logged_in);
    assert_eq!(player.connection, None);
    assert_eq!(player.uuid, uuid);
    assert_eq!(player.name, "Alice");
    assert!(player.roles.contains("Moderator"));
    assert_eq!(registry.state(conn.id()).await, None);
    assert_eq!(registry.connection_count().await, 0);
}

#[tokio::test]
async fn test_connect_response_success_sets_client_id() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    let (conn, _peer) = join(&registry, "u-alice", "Alice").await;

    let player = registry.player_for(conn.id()).await.unwrap();
    assert!(player.logged_in);
    assert_eq!(player.client_id, 7);
    assert_eq!(registry.state(conn.id()).await, Some(ConnectionState::Connected));

    registry.on_heartbeat(&conn).await.unwrap();
    assert_eq!(
        registry.state(conn.id()).await,
        Some(ConnectionState::ConnectedWithHeartbeat)
    );
}

#[tokio::test]
async fn test_connect_response_failure_leaves_player_logged_out() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = connection();

    registry.on_protocol_version(&conn).await.unwrap();
    registry
        .on_client_connect(&conn, &connect_payload("u-bob", "Bob"))
        .await
        .unwrap();
    let player = registry
        .on_connect_response(
            &conn,
            ConnectResponse {
                success: false,
                client_id: 12,
            },
        )
        .await
        .unwrap();

    assert!(!player.logged_in);
    assert_eq!(player.client_id, UNBOUND_CLIENT_ID);
    let state = registry.state(conn.id()).await.unwrap();
    assert_eq!(state, ConnectionState::ConnectResponseSent);
    assert!(!state.is_connected());
}

#[tokio::test]
async fn test_connect_response_without_client_connect_fails() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = connection();

    let result = registry
        .on_connect_response(
            &conn,
            ConnectResponse {
                success: true,
                client_id: 1,
            },
        )
        .await;

    assert!(matches!(result, Err(SessionError::NoPlayerBound(id)) if id == conn.id()));
}

#[tokio::test]
async fn test_reconnect_refreshes_name_and_keeps_roles() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let uuid = PlayerUuid::new("u-carol");

    let (first, _peer) = join(&registry, "u-carol", "Carol").await;
    registry.add_role(&uuid, Role::Guest).await.unwrap();
    registry.on_disconnect(first.id()).await.unwrap();

    let (second, _peer) = join(&registry, "u-carol", "Caz").await;

    let player = registry.player_for(second.id()).await.unwrap();
    assert_eq!(player.name, "Caz");
    assert!(player.roles.contains("Guest"));
    assert_eq!(registry.players().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_connection_for_bound_uuid_is_refused() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (first, _peer) = join(&registry, "u-dave", "Dave").await;
    let (second, _peer2) = connection();

    registry.on_protocol_version(&second).await.unwrap();
    let result = registry
        .on_client_connect(&second, &connect_payload("u-dave", "Dave"))
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Store(StoreError::AlreadyBound { connection, .. })) if connection == first.id()
    ));
    let player = registry.player(&PlayerUuid::new("u-dave")).await.unwrap();
    assert_eq!(player.connection, Some(first.id()));
}

#[tokio::test]
async fn test_owner_uuid_gets_every_role() {
    let dir = TempDir::new().unwrap();
    let registry: Registry = SessionRegistry::open(RegistryConfig {
        owner_uuid: Some("u-owner".into()),
        ..config(&dir)
    })
    .unwrap();

    let (conn, _peer) = join(&registry, "u-owner", "Boss").await;

    let player = registry.player_for(conn.id()).await.unwrap();
    let expected: Vec<&str> = Role::ALL.iter().map(|role| role.name()).collect();
    for name in expected {
        assert!(player.roles.contains(name), "owner is missing {name}");
    }
    assert_eq!(player.roles.len(), Role::ALL.len());
}

// =========================================================================
// Dispatch and rejection
// =========================================================================

#[tokio::test]
async fn test_dispatch_client_connect_without_uuid_rejects_connection() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, mut peer) = connection();

    registry
        .dispatch(&conn, ProtocolEvent::ProtocolVersion)
        .await
        .unwrap();
    let result = registry
        .dispatch(&conn, ProtocolEvent::ClientConnect(ClientConnect::default()))
        .await;

    assert!(matches!(result, Err(SessionError::MalformedPayload(_))));
    let outbound = peer.drain();
    assert!(matches!(&outbound[0], Outbound::Message(text) if text.starts_with("connection rejected")));
    assert_eq!(outbound[1], Outbound::Disconnected);
    assert!(conn.is_closed());
    assert_eq!(registry.connection_count().await, 0);
    assert!(registry.players().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatch_client_connect_storage_failure_rejects_connection() {
    let dir = TempDir::new().unwrap();
    {
        let registry = open_rationed(&dir, 0);
        let (conn, mut peer) = connection();

        registry
            .dispatch(&conn, ProtocolEvent::ProtocolVersion)
            .await
            .unwrap();
        let result = registry
            .dispatch(&conn, ProtocolEvent::ClientConnect(connect_payload("u-ivy", "Ivy")))
            .await;

        assert!(result.unwrap_err().is_storage_failure());
        let outbound = peer.drain();
        assert!(matches!(&outbound[0], Outbound::Message(text) if text.starts_with("connection rejected")));
        assert_eq!(outbound[1], Outbound::Disconnected);
        assert_eq!(registry.connection_count().await, 0);
        assert!(registry.players().await.unwrap().is_empty());
    }

    // Nothing reached the disk either.
    let registry = open_registry(&dir);
    assert!(registry.players().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_response_storage_failure_keeps_state() {
    let dir = TempDir::new().unwrap();
    // One encode to create the record, one to bind it.
    let registry = open_rationed(&dir, 2);
    let (conn, _peer) = connection();
    registry.on_protocol_version(&conn).await.unwrap();
    registry
        .on_client_connect(&conn, &connect_payload("u-jo", "Jo"))
        .await
        .unwrap();

    let result = registry
        .on_connect_response(
            &conn,
            ConnectResponse {
                success: true,
                client_id: 4,
            },
        )
        .await;

    assert!(result.unwrap_err().is_storage_failure());
    assert_eq!(
        registry.state(conn.id()).await,
        Some(ConnectionState::ClientConnectReceived)
    );
    let player = registry.player_for(conn.id()).await.unwrap();
    assert_eq!(player.client_id, UNBOUND_CLIENT_ID);
}

#[tokio::test]
async fn test_strict_policy_rejects_out_of_order_heartbeat() {
    let dir = TempDir::new().unwrap();
    let registry: Registry = SessionRegistry::open(RegistryConfig {
        transition_policy: TransitionPolicy::Strict,
        ..config(&dir)
    })
    .unwrap();
    let (conn, mut peer) = connection();

    registry
        .dispatch(&conn, ProtocolEvent::ProtocolVersion)
        .await
        .unwrap();
    let result = registry.dispatch(&conn, ProtocolEvent::Heartbeat).await;

    assert!(matches!(
        result,
        Err(SessionError::InvalidTransition {
            from: Some(ConnectionState::VersionSent),
            ..
        })
    ));
    assert!(peer.drain().contains(&Outbound::Disconnected));
    assert_eq!(registry.state(conn.id()).await, None);
}

#[tokio::test]
async fn test_permissive_policy_accepts_out_of_order_heartbeat() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, mut peer) = connection();

    let state = registry.on_heartbeat(&conn).await.unwrap();

    assert_eq!(state, ConnectionState::ConnectedWithHeartbeat);
    assert!(peer.drain().is_empty());
}

#[tokio::test]
async fn test_dispatch_disconnect_twice_is_harmless() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = join(&registry, "u-erin", "Erin").await;

    registry
        .dispatch(&conn, ProtocolEvent::ClientDisconnect)
        .await
        .unwrap();
    registry
        .dispatch(&conn, ProtocolEvent::ServerDisconnect)
        .await
        .unwrap();

    let player = registry.player(&PlayerUuid::new("u-erin")).await.unwrap();
    assert!(!player.logged_in);
}

#[tokio::test]
async fn test_dropped_client_connect_is_released_on_disconnect() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = connection();
    let uuid = PlayerUuid::new("u-kai");
    registry.on_protocol_version(&conn).await.unwrap();

    // Give up on the connect while the record is still being written.
    let _ = tokio::time::timeout(
        Duration::ZERO,
        registry.on_client_connect(&conn, &connect_payload("u-kai", "Kai")),
    )
    .await;
    registry.on_disconnect(conn.id()).await.unwrap();

    wait_released(&registry, &uuid).await;
    assert_eq!(registry.connection_count().await, 0);
    // A fresh connection can take the player.
    let (conn, _peer) = join(&registry, "u-kai", "Kai").await;
    assert_eq!(registry.player_for(conn.id()).await.unwrap().uuid, uuid);
}

#[tokio::test]
async fn test_client_connect_new_uuid_on_same_connection_releases_previous() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = join(&registry, "u-lee", "Lee").await;

    registry
        .on_client_connect(&conn, &connect_payload("u-max", "Max"))
        .await
        .unwrap();

    let lee = registry.player(&PlayerUuid::new("u-lee")).await.unwrap();
    assert!(!lee.logged_in);
    assert_eq!(lee.connection, None);
    assert_eq!(
        registry.player_for(conn.id()).await.unwrap().uuid,
        PlayerUuid::new("u-max")
    );

    registry.on_disconnect(conn.id()).await.unwrap();

    let max = registry.player(&PlayerUuid::new("u-max")).await.unwrap();
    assert!(!max.logged_in);
    assert_eq!(max.connection, None);
}

#[tokio::test]
async fn test_warp_command_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, mut peer) = join(&registry, "u-finn", "Finn").await;
    let before = registry.player_for(conn.id()).await.unwrap();

    registry
        .dispatch(&conn, ProtocolEvent::WarpCommand)
        .await
        .unwrap();

    assert_eq!(registry.player_for(conn.id()).await.unwrap(), before);
    assert_eq!(registry.state(conn.id()).await, Some(ConnectionState::Connected));
    assert!(peer.drain().is_empty());
}

// =========================================================================
// World start
// =========================================================================

#[tokio::test]
async fn test_world_start_with_coordinates_records_planet() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = join(&registry, "u-gil", "Gil").await;

    let location = registry
        .on_world_start(&conn, &world_at("alpha", (0, 1, 2), 3, 4))
        .await
        .unwrap();

    assert_eq!(location.to_string(), "alpha:0:1:2:3:4");
    let player = registry.player_for(conn.id()).await.unwrap();
    assert_eq!(player.planet, "alpha:0:1:2:3:4");
    assert!(!player.on_ship);
    assert_eq!(registry.planets().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_world_start_without_coordinates_boards_ship() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = join(&registry, "u-hal", "Hal").await;
    registry
        .on_world_start(&conn, &world_at("alpha", (0, 0, 0), 1, 0))
        .await
        .unwrap();

    let location = registry
        .on_world_start(&conn, &WorldStart::default())
        .await
        .unwrap();

    assert_eq!(location, Location::Ship);
    let player = registry.player_for(conn.id()).await.unwrap();
    assert!(player.on_ship);
    assert!(player.planet.is_empty());
}

// =========================================================================
// Kick
// =========================================================================

#[tokio::test]
async fn test_kick_unknown_name_replies_only_to_issuer() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (admin, mut admin_peer) = join(&registry, "u-admin", "Admin").await;
    let (_other, mut other_peer) = join(&registry, "u-ivy", "Ivy").await;
    let before = registry.players().await.unwrap();

    let outcome = registry.kick(&admin, "NoSuchPlayer").await.unwrap();

    assert_eq!(outcome, KickOutcome::NotFound);
    assert_eq!(
        admin_peer.messages(),
        vec!["Couldn't find a player with name NoSuchPlayer".to_string()]
    );
    assert!(other_peer.drain().is_empty());
    assert_eq!(registry.players().await.unwrap(), before);
    assert_eq!(registry.connection_count().await, 2);
}

#[tokio::test]
async fn test_kick_found_disconnects_target_and_broadcasts() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (admin, mut admin_peer) = join(&registry, "u-admin", "Admin").await;
    let (target, mut target_peer) = join(&registry, "u-jo", "Jo").await;

    let outcome = registry.kick(&admin, "jo").await.unwrap();

    assert_eq!(
        outcome,
        KickOutcome::Kicked {
            name: "Jo".to_string()
        }
    );
    assert!(target.is_closed());
    assert!(target_peer.drain().contains(&Outbound::Disconnected));
    assert_eq!(admin_peer.messages(), vec!["Admin has kicked Jo.".to_string()]);

    let player = registry.player(&PlayerUuid::new("u-jo")).await.unwrap();
    assert!(!player.logged_in);
    assert_eq!(player.connection, None);

    // The transport's own disconnect event arrives later and finds nothing.
    registry.on_disconnect(target.id()).await.unwrap();
    assert_eq!(registry.connection_count().await, 1);

    let again = registry.kick(&admin, "Jo").await.unwrap();
    assert_eq!(again, KickOutcome::NotFound);
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_shutdown_logs_everyone_out_durably() {
    let dir = TempDir::new().unwrap();
    {
        let registry = open_registry(&dir);
        join(&registry, "u-kim", "Kim").await;
        join(&registry, "u-lee", "Lee").await;

        registry.shutdown().await.unwrap();

        assert!(matches!(registry.shutdown().await, Err(SessionError::ShutDown)));
        assert!(matches!(registry.players().await, Err(SessionError::ShutDown)));
        assert_eq!(registry.connection_count().await, 0);
    }

    let reopened = open_registry(&dir);
    let players = reopened.players().await.unwrap();

    assert_eq!(players.len(), 2);
    for player in players {
        assert!(!player.logged_in, "{} still logged in", player.name);
        assert_eq!(player.connection, None);
    }
}

#[tokio::test]
async fn test_disconnect_after_shutdown_is_ignored() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let (conn, _peer) = join(&registry, "u-max", "Max").await;

    registry.shutdown().await.unwrap();

    registry.on_disconnect(conn.id()).await.unwrap();
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_for_same_uuid_create_one_record() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(open_registry(&dir));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let (conn, _peer) = connection();
            registry.on_protocol_version(&conn).await.unwrap();
            registry
                .on_client_connect(&conn, &connect_payload("u-twin", "Twin"))
                .await
        }));
    }

    let mut bound = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => bound += 1,
            Err(SessionError::Store(StoreError::AlreadyBound { .. })) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(bound, 1);
    assert_eq!(registry.players().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_world_starts_store_planet_once() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(open_registry(&dir));

    let mut conns = Vec::new();
    for i in 0..6 {
        let (conn, peer) = join(&registry, &format!("u-{i}"), &format!("P{i}")).await;
        conns.push((conn, peer));
    }

    let mut tasks = Vec::new();
    for (conn, _) in &conns {
        let registry = Arc::clone(&registry);
        let conn = Arc::clone(conn);
        tasks.push(tokio::spawn(async move {
            registry
                .on_world_start(&conn, &world_at("beta", (4, -2, 9), 1, 0))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let planets = registry.planets().await.unwrap();
    assert_eq!(planets.len(), 1);
    assert_eq!(planets[0].key(), "beta:4:-2:9:1:0");
    for player in registry.players().await.unwrap() {
        assert_eq!(player.planet, "beta:4:-2:9:1:0");
    }
}
