//! The line-buffered transport (§4.1): TCP dial, optional TLS, and the
//! `read`/`readline`/`write`/`close` contract.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::stream::MaybeTlsStream;
use crate::tls;

/// Default chunk size for [`LineTransport::read`] when the caller doesn't
/// need a smaller one: one MTU-ish read plus CRLF slack (§9 original
/// source supplement, item 3).
pub const DEFAULT_READ_CHUNK: usize = 8194;

/// Grace window used to coalesce several small packets from a chatty
/// server into one split pass (§4.1 "Algorithm for `readline`", step 3).
const GRACE_WINDOW: Duration = Duration::from_millis(100);

/// Result of [`LineTransport::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Data(String),
    Empty,
    Closed,
}

/// Result of [`LineTransport::readline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineResult {
    Line(String),
    Empty,
    Closed,
}

/// A line-buffered transport over any `AsyncRead + AsyncWrite` stream.
///
/// Generic so tests can drive it over [`tokio::io::duplex`]; [`connect`]
/// wires up a real [`MaybeTlsStream`] for production use.
///
/// [`connect`]: LineTransport::connect
pub struct LineTransport<S> {
    stream: S,
    residual: String,
    queue: VecDeque<String>,
    closed: bool,
}

impl LineTransport<MaybeTlsStream> {
    /// Opens a TCP connection to `config.host:config.port`, optionally
    /// wrapping it in TLS (§4.1 "`open`").
    pub async fn connect(config: &TransportConfig) -> TransportResult<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        debug!(host = %config.host, port = config.port, secure = config.secure, "dialing");

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|source| TransportError::ConnectError {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;

        let stream = if config.secure {
            let tls_config = tls::client_config(config.accept_any_peer_cert);
            let connector = TlsConnector::from(tls_config);
            let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
                .map_err(|e| TransportError::ConnectError {
                    host: config.host.clone(),
                    port: config.port,
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                })?;
            let tls_stream = connector.connect(server_name, tcp).await.map_err(|e| {
                TransportError::ConnectError {
                    host: config.host.clone(),
                    port: config.port,
                    source: e,
                }
            })?;
            MaybeTlsStream::Tls(Box::new(tls_stream))
        } else {
            MaybeTlsStream::Plain(tcp)
        };

        Ok(Self::from_stream(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineTransport<S> {
    /// Wraps an already-established stream. Used directly by tests with an
    /// in-memory duplex; [`LineTransport::connect`] uses it internally
    /// once the socket (and optional TLS handshake) has completed.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream,
            residual: String::new(),
            queue: VecDeque::new(),
            closed: false,
        }
    }

    /// Reads up to `max_bytes`, decoded as ASCII. `timeout = None` blocks;
    /// `Some(d)` returns [`ReadResult::Empty`] if nothing arrives within
    /// `d` (§4.1 "`read`").
    pub async fn read(
        &mut self,
        max_bytes: usize,
        timeout: Option<Duration>,
    ) -> TransportResult<ReadResult> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut buf = vec![0u8; max_bytes];
        let n = match timeout {
            None => self.stream.read(&mut buf).await?,
            Some(d) => match tokio::time::timeout(d, self.stream.read(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(ReadResult::Empty),
            },
        };
        if n == 0 {
            self.closed = true;
            return Ok(ReadResult::Closed);
        }
        buf.truncate(n);
        Ok(ReadResult::Data(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Returns the next CRLF-terminated line (CRLF stripped), per the
    /// algorithm in §4.1. Blank lines produced by stray CRs are suppressed
    /// (§9 open question (a); preserved intentionally, not "fixed").
    pub async fn readline(&mut self, timeout: Option<Duration>) -> TransportResult<LineResult> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        loop {
            while let Some(line) = self.queue.pop_front() {
                if !line.is_empty() {
                    return Ok(LineResult::Line(line));
                }
            }

            let mut chunk = vec![0u8; DEFAULT_READ_CHUNK];
            let n = match timeout {
                None => self.stream.read(&mut chunk).await?,
                Some(d) => match tokio::time::timeout(d, self.stream.read(&mut chunk)).await {
                    Ok(result) => result?,
                    Err(_) => return Ok(LineResult::Empty),
                },
            };
            if n == 0 {
                self.closed = true;
                return Ok(LineResult::Closed);
            }
            chunk.truncate(n);
            self.residual
                .push_str(&String::from_utf8_lossy(&chunk));

            // Grace window: coalesce further chunks from a chatty server
            // before splitting on CRLF (step 3).
            loop {
                let mut grace_buf = vec![0u8; DEFAULT_READ_CHUNK];
                match tokio::time::timeout(GRACE_WINDOW, self.stream.read(&mut grace_buf)).await {
                    Ok(Ok(0)) => break,
                    Ok(Ok(m)) => {
                        grace_buf.truncate(m);
                        self.residual
                            .push_str(&String::from_utf8_lossy(&grace_buf));
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => break,
                }
            }

            self.split_residual_into_queue();
            trace!(queued = self.queue.len(), "split residual into lines");
        }
    }

    fn split_residual_into_queue(&mut self) {
        let ends_with_crlf = self.residual.ends_with("\r\n");
        let mut segments: Vec<&str> = self.residual.split("\r\n").collect();
        // `split` always yields a trailing element even when the string
        // ends with the separator; drop it when complete, keep it as the
        // new residual otherwise.
        let trailing = segments.pop().unwrap_or_default().to_string();
        for seg in segments {
            self.queue.push_back(seg.to_string());
        }
        self.residual = if ends_with_crlf {
            String::new()
        } else {
            trailing
        };
    }

    /// Writes the entire payload. Fails with [`TransportError::WriteError`]
    /// on partial write or connection loss (§4.1 "`write`").
    pub async fn write(&mut self, payload: &str) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.stream
            .write_all(payload.as_bytes())
            .await
            .map_err(TransportError::WriteError)?;
        self.stream.flush().await.map_err(TransportError::WriteError)
    }

    /// Orderly shutdown of both directions, then release. Idempotent
    /// (§4.1 "`close`", §9 item 4: no bytes are written here — `quit` is
    /// the caller that writes `QUIT\r\n` first).
    pub async fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => {
                warn!(error = %e, "error shutting down transport");
                Err(TransportError::Io(e))
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pushes `line` back to the front of the internal line queue, so the
    /// next `readline` returns it again. Used by callers that peeked at a
    /// line to make a decision (e.g. login's MOTD line) and need to let
    /// the application observe it too.
    pub fn unread_line(&mut self, line: String) {
        self.queue.push_front(line);
    }
}
