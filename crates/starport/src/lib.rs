//! # Starport
//!
//! Player and session registry for a multiplayer game proxy.
//!
//! The proxy's packet layer parses game traffic into events; Starport
//! tracks each connection through the connect handshake, binds it to a
//! durable player record, records where players go, and exposes the
//! moderation hooks (`kick`) and lifecycle (`shutdown`) around that.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use starport::prelude::*;
//!
//! # async fn run() -> Result<(), StarportError> {
//! starport::telemetry::init();
//!
//! let starport: Arc<Starport<LoopbackConnection>> = Arc::new(
//!     StarportBuilder::new()
//!         .player_db("config/player_db")
//!         .owner_uuid("f00dfeed")
//!         .build()?,
//! );
//!
//! // For each accepted client, hand the connection and its frames over:
//! // tokio::spawn(Arc::clone(&starport).serve(conn, frames));
//!
//! starport.shutdown().await
//! # }
//! ```

mod error;
mod handler;
mod server;
pub mod telemetry;

pub use error::StarportError;
pub use server::{Starport, StarportBuilder};

/// Everything a proxy host needs in one import.
pub mod prelude {
    pub use crate::{Starport, StarportBuilder, StarportError};

    pub use starport_protocol::{
        ClientConnect, Codec, ConnectResponse, JsonCodec, PlayerUuid, ProtocolEvent, WorldStart,
    };
    pub use starport_session::{
        CommandSpec, ConnectionState, KickOutcome, Location, RegistryConfig, SessionError,
        SessionRegistry, TransitionPolicy,
    };
    pub use starport_store::{Planet, Player, Role, RoleHierarchy, StoreError};
    pub use starport_transport::{
        Connection, ConnectionId, LoopbackConnection, LoopbackPeer, TransportError,
    };
}
