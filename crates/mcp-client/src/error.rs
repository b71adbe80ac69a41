//! Session error taxonomy (§7).

use thiserror::Error;

/// A specialized `Result` type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by [`crate::Session`]. `ConnectError`,
/// `HandshakeTimeout`, `UnsupportedProtocol`, `WriteError`, and
/// `ReadError` are fatal to the session; everything else is fatal only
/// to the operation that raised it (§7 "Recovery policy"). Malformed
/// *inbound* lines are never an error here — they surface through
/// `process`'s `unrecognized` channel instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SessionError {
    /// TCP/TLS `open` failed.
    #[error("connect failed: {0}")]
    ConnectError(#[source] mcp_transport::TransportError),

    /// The server banner or catalog exchange did not complete within
    /// budget.
    #[error("handshake timed out: {0}")]
    HandshakeTimeout(String),

    /// The server's advertised version range does not include the
    /// protocol version this client supports.
    #[error("server does not support protocol {supported}: offered [{min}, {max}]")]
    UnsupportedProtocol {
        supported: String,
        min: String,
        max: String,
    },

    /// The server banner did not match the expected grammar.
    #[error("malformed server header: {0}")]
    MalformedHeader(String),

    /// `negotiate` called after negotiation already closed.
    #[error("negotiate called after the negotiated set was already closed")]
    AlreadyNegotiated,

    /// Requested package is not present in the server's catalog.
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    /// `call` issued for a package outside the negotiated set.
    #[error("package not negotiated: {0}")]
    PackageNotNegotiated(String),

    /// Asymmetric `lo`/`hi`, or other caller-supplied argument mismatch.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Partial or failed write to the transport.
    #[error("write failed: {0}")]
    WriteError(#[source] mcp_transport::TransportError),

    /// A read-side transport failure other than an orderly close (e.g. a
    /// raw I/O error), surfacing from the handshake, `process`, or
    /// `login`. Not named in the original error table; distinguished from
    /// `ConnectError` because the socket was already open and from
    /// `Closed` because the peer did not shut down cleanly.
    #[error("read failed: {0}")]
    ReadError(#[source] mcp_transport::TransportError),

    /// The session is closed (peer closed, or `close`/`quit` was called).
    /// Terminal: every operation after this returns it again.
    #[error("session closed")]
    Closed,
}

/// Maps a transport failure surfacing from a read-side operation
/// (`readline` inside the handshake, `process`, or `login`) to a
/// [`SessionError`]. `Closed` passes through as-is; anything else becomes
/// `ReadError` rather than `ConnectError`, since by the time any of these
/// call sites run the socket has already connected successfully.
pub(crate) fn from_transport_closed(err: mcp_transport::TransportError) -> SessionError {
    match err {
        mcp_transport::TransportError::Closed => SessionError::Closed,
        other => SessionError::ReadError(other),
    }
}
