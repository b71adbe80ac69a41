//! Line-buffered transport for MUD Client Protocol (MCP) 2.1 (§4.1).
//!
//! Knows nothing about MCP framing or sessions: it opens one TCP
//! connection (optionally TLS), and exposes timed `read`/`readline`,
//! `write`, and `close` over a residual byte buffer so MCP lines embedded
//! in an otherwise plain-text stream can be pulled out one at a time.

mod config;
mod error;
mod line_transport;
mod stream;
mod tls;

pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use line_transport::{DEFAULT_READ_CHUNK, LineResult, LineTransport, ReadResult};
pub use stream::MaybeTlsStream;
