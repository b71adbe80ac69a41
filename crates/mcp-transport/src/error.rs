//! Transport error types (§7).

use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors surfaced by [`crate::LineTransport`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// DNS, socket, or TLS handshake failure during `connect`.
    #[error("failed to connect to {host}:{port}: {source}")]
    ConnectError {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Partial write, or write attempted after the peer dropped the
    /// connection.
    #[error("write failed: {0}")]
    WriteError(#[source] std::io::Error),

    /// The peer closed the connection in an orderly fashion, or the local
    /// side closed it. Terminal for the session (§7 "Recovery policy").
    #[error("transport closed")]
    Closed,

    /// Any other I/O failure not covered above.
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
