//! Per-connection frame loop.
//!
//! Each connection's frames are handled by one task, strictly in order, so
//! a handler that suspends (a new player being flushed to disk) holds back
//! that connection's later events and nobody else's.

use std::sync::Arc;

use starport_protocol::Codec;
use starport_transport::{Connection, ConnectionId};
use tokio::sync::mpsc;

use crate::{Starport, StarportError};

/// Drop guard that releases a connection when its frame loop exits.
///
/// This runs even if the loop panics. `Drop` is synchronous, so the
/// async teardown goes on a fire-and-forget task.
struct ConnectionGuard<C: Connection, K: Codec> {
    conn_id: ConnectionId,
    starport: Arc<Starport<C, K>>,
}

impl<C: Connection, K: Codec> Drop for ConnectionGuard<C, K> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let starport = Arc::clone(&self.starport);
        tokio::spawn(async move {
            if let Err(e) = starport.registry().on_disconnect(conn_id).await {
                tracing::warn!(%conn_id, error = %e, "release on connection end failed");
            }
        });
    }
}

/// Handles one connection from its first frame to close.
pub(crate) async fn serve_connection<C: Connection, K: Codec>(
    starport: Arc<Starport<C, K>>,
    conn: Arc<C>,
    mut frames: mpsc::Receiver<Vec<u8>>,
) -> Result<(), StarportError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "serving connection");

    let _guard = ConnectionGuard {
        conn_id,
        starport: Arc::clone(&starport),
    };

    let mut registered = false;
    while let Some(frame) = frames.recv().await {
        let failed = match starport.handle_frame(&conn, &frame).await {
            Ok(()) => false,
            Err(StarportError::Protocol(e)) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode frame");
                continue;
            }
            Err(e) if e.is_storage_failure() => {
                tracing::error!(%conn_id, error = %e, "storage failure while handling frame");
                true
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "frame handler failed");
                true
            }
        };

        // Rejected, kicked, or disconnected: nothing more to do.
        match starport.registry().state(conn_id).await {
            Some(_) => registered = true,
            None if registered || failed => {
                tracing::debug!(%conn_id, "connection torn down, leaving frame loop");
                break;
            }
            None => {}
        }
    }

    // _guard drops here → connection released.
    Ok(())
}
