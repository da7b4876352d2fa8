//! In-process connection backed by a Tokio channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::{Connection, ConnectionId, TransportError};

/// Something the registry pushed towards the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A chat line sent with [`Connection::send_message`].
    Message(String),
    /// The connection was closed with [`Connection::disconnect`].
    Disconnected,
}

/// A [`Connection`] whose traffic ends up in a [`LoopbackPeer`].
#[derive(Debug)]
pub struct LoopbackConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
}

/// The receiving half of a [`LoopbackConnection`].
#[derive(Debug)]
pub struct LoopbackPeer {
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl LoopbackConnection {
    /// Creates a connection with a fresh id and the peer that observes it.
    pub fn pair() -> (Self, LoopbackPeer) {
        Self::with_id(ConnectionId::next())
    }

    /// Same as [`pair`](Self::pair) with a caller-chosen id.
    pub fn with_id(id: ConnectionId) -> (Self, LoopbackPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            id,
            tx,
            closed: AtomicBool::new(false),
        };
        (conn, LoopbackPeer { rx })
    }

    /// Returns `true` once [`disconnect`](Connection::disconnect) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn push(&self, item: Outbound) {
        // A dropped peer only means nobody is watching.
        let _ = self.tx.send(item);
    }
}

impl Connection for LoopbackConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_message(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let result = if self.is_closed() {
            Err(TransportError::ConnectionClosed(self.id.to_string()))
        } else {
            self.push(Outbound::Message(text.to_string()));
            Ok(())
        };
        async move { result }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(conn_id = %self.id, "loopback connection closed");
            self.push(Outbound::Disconnected);
        }
        async { Ok(()) }
    }
}

impl LoopbackPeer {
    /// Waits for the next outbound item. `None` once the connection is dropped.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Returns everything sent so far without waiting.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }

    /// Returns only the chat lines sent so far.
    pub fn messages(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Message(text) => Some(text),
                Outbound::Disconnected => None,
            })
            .collect()
    }
}
