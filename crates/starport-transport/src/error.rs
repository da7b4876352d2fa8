/// Errors that can occur when talking to a live connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was already closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing to the peer failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),
}
