//! `Starport` builder and frame entry points.
//!
//! This is what a proxy host holds on to. It ties the layers together:
//! frames → protocol (decode) → session (dispatch) → store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use starport_protocol::{Codec, JsonCodec, ProtocolEvent};
use starport_session::{RegistryConfig, SessionRegistry, TransitionPolicy};
use starport_transport::Connection;
use tokio::sync::mpsc;

use crate::StarportError;
use crate::handler::serve_connection;

/// Builder for configuring and opening a [`Starport`].
///
/// # Example
///
/// ```rust,ignore
/// use starport::prelude::*;
///
/// let starport = Starport::<MyConnection>::builder()
///     .player_db("/var/lib/proxy/player_db")
///     .owner_uuid("f00dfeed")
///     .transition_policy(TransitionPolicy::Strict)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StarportBuilder {
    config: RegistryConfig,
}

impl StarportBuilder {
    /// Creates a builder with [`RegistryConfig::default`] settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole registry configuration.
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where the player database lives.
    pub fn player_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.player_db = path.into();
        self
    }

    /// Sets the uuid that always holds every role.
    pub fn owner_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.config.owner_uuid = Some(uuid.into());
        self
    }

    /// Sets the upper bound on a durable flush.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.config.transition_policy = policy;
        self
    }

    /// Opens the player database and builds a `Starport` decoding JSON
    /// frames.
    pub fn build<C: Connection>(self) -> Result<Starport<C, JsonCodec>, StarportError> {
        self.build_with_codec(JsonCodec)
    }

    /// Same as [`build`](Self::build) with a custom frame codec.
    pub fn build_with_codec<C: Connection, K: Codec>(
        self,
        codec: K,
    ) -> Result<Starport<C, K>, StarportError> {
        let registry = SessionRegistry::open(self.config)?;
        Ok(Starport { registry, codec })
    }
}

/// An open player/session registry plus the codec its frames arrive in.
///
/// Share it behind an `Arc`: one [`serve`](Self::serve) task per
/// connection, and [`shutdown`](Self::shutdown) once at process exit.
pub struct Starport<C: Connection, K: Codec = JsonCodec> {
    registry: SessionRegistry<C>,
    codec: K,
}

impl<C: Connection> Starport<C, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> StarportBuilder {
        StarportBuilder::new()
    }
}

impl<C: Connection, K: Codec> Starport<C, K> {
    /// The registry, for commands and queries.
    pub fn registry(&self) -> &SessionRegistry<C> {
        &self.registry
    }

    /// Decodes one frame and dispatches the event it carries.
    ///
    /// # Errors
    /// [`StarportError::Protocol`] if the frame doesn't decode, otherwise
    /// whatever the handler returned. A failed handshake event has already
    /// rejected the connection by the time this returns.
    pub async fn handle_frame(&self, conn: &Arc<C>, frame: &[u8]) -> Result<(), StarportError> {
        let event: ProtocolEvent = self.codec.decode(frame)?;
        self.registry.dispatch(conn, event).await?;
        Ok(())
    }

    /// Feeds every frame from `frames` through [`handle_frame`](Self::handle_frame),
    /// in order, until the channel closes or the connection is torn down.
    ///
    /// The connection is released when this returns, however it returns.
    pub async fn serve(
        self: Arc<Self>,
        conn: Arc<C>,
        frames: mpsc::Receiver<Vec<u8>>,
    ) -> Result<(), StarportError> {
        serve_connection(self, conn, frames).await
    }

    /// Logs every player out, flushes, and releases the player database.
    pub async fn shutdown(&self) -> Result<(), StarportError> {
        self.registry.shutdown().await?;
        Ok(())
    }
}
