//! Connection abstraction for Starport.
//!
//! The proxy owns its network connections; the session registry only needs
//! to talk *through* them. [`Connection`] is the small surface it relies on:
//! an id to key its tables by, a way to send a chat line to the client, and
//! a way to tear the connection down.
//!
//! [`LoopbackConnection`] is an in-process implementation that records what
//! was sent, used by tests and by hosts that drive the registry from a
//! scripted event feed.

mod error;
mod loopback;

pub use error::TransportError;
pub use loopback::{LoopbackConnection, LoopbackPeer, Outbound};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for [`ConnectionId::next`].
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
///
/// The registry stores this, never the connection itself, on a player
/// record. Looking a connection up by id means a torn-down connection
/// simply stops resolving instead of being kept alive by the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live client connection, as seen by the registry.
///
/// The methods return `impl Future + Send` rather than being `async fn` so
/// that registry futures stay `Send` and can be spawned onto the runtime.
pub trait Connection: Send + Sync + 'static {
    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Sends a chat line to this client only.
    fn send_message(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Forcibly closes the connection.
    ///
    /// Closing an already-closed connection must succeed.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
