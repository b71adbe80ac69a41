//! The session state machine (§4.3): handshake, package negotiation,
//! `call`, `process`, `login`, `quit`/`close`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mcp_transport::{LineResult, LineTransport, MaybeTlsStream, TransportConfig};
use mcp_wire::{Continuation, Header, Outbound, Terminator, Token, Value, compose, data_tags_match, escape, tokenize};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

use crate::catalog::{Catalog, CatalogEntry, NegotiatedSet};
use crate::error::{SessionError, SessionResult, from_transport_closed};
use crate::reassembly::{InboundMessage, Reassembling};
use crate::version::{Version, in_range};

/// Budget for each `readline` while scanning for the server banner
/// (§4.3 step 1).
const BANNER_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Consecutive empty reads before giving up on the banner (§4.3 step 2).
const BANNER_EMPTY_BUDGET: u32 = 3;
/// Total time allowed for the catalog exchange (§4.3 step 4).
const CATALOG_BUDGET: Duration = Duration::from_secs(5);
/// Per-line grace while draining stray banner text before the catalog
/// exchange (§9 supplement 2: mirrors the original's `while
/// readline(0.1): pass` loop run once between the client key and the
/// catalog exchange).
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);
/// Per-line grace while `process` drains buffered inbound material
/// (§4.3 "`process`").
const PROCESS_LINE_TIMEOUT: Duration = Duration::from_millis(250);

/// A single entry of a `negotiate` request: either a bare package name
/// (use the catalog's advertised range) or a name with a caller-chosen
/// range (§4.3 "`negotiate`" step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageRequest {
    Name(String),
    WithRange(String, Version, Version),
}

/// The return value of [`Session::process`].
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub results: HashMap<String, Vec<InboundMessage>>,
    pub unrecognized: Vec<String>,
}

/// Drives one MCP 2.1 session over a line-buffered transport.
///
/// Owns its transport exclusively (§3 "Lifecycles"). Not safe for
/// concurrent use from multiple tasks (§5) — callers needing concurrency
/// must serialize externally.
pub struct Session<S> {
    transport: LineTransport<S>,
    auth: String,
    server_min: Version,
    server_max: Version,
    catalog: Catalog,
    negotiated: NegotiatedSet,
    reassembling: Option<Reassembling>,
}

impl Session<MaybeTlsStream> {
    /// Opens a TCP (optionally TLS) connection and runs the handshake
    /// (§4.3 states `Dialing` through `CollectingCatalog`).
    pub async fn connect(config: &TransportConfig) -> SessionResult<Self> {
        let transport = LineTransport::connect(config)
            .await
            .map_err(SessionError::ConnectError)?;
        Self::handshake(transport).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    /// Runs the handshake over an already-established stream. Used
    /// directly by tests against [`tokio::io::duplex`]; [`Session::connect`]
    /// uses it after dialing a real socket.
    pub async fn from_stream(stream: S) -> SessionResult<Self> {
        Self::handshake(LineTransport::from_stream(stream)).await
    }

    async fn handshake(mut transport: LineTransport<S>) -> SessionResult<Self> {
        let auth = generate_token();
        debug!(%auth, "generated session auth key");

        let (server_min, server_max) = Self::await_server_header(&mut transport).await?;
        let supported = Version::supported();
        if !in_range(&supported, &server_min, &server_max) {
            return Err(SessionError::UnsupportedProtocol {
                supported: supported.to_string(),
                min: server_min.to_string(),
                max: server_max.to_string(),
            });
        }

        let key_line = format!(
            "#$#mcp authentication-key: \"{}\" version: \"{supported}\" to: \"{supported}\"\r\n",
            escape(&auth),
        );
        transport
            .write(&key_line)
            .await
            .map_err(SessionError::WriteError)?;

        Self::drain_buffered_lines(&mut transport).await?;

        let catalog = Self::collect_catalog(&mut transport, &auth).await?;

        Ok(Self {
            transport,
            auth,
            server_min,
            server_max,
            catalog,
            negotiated: NegotiatedSet::new(),
            reassembling: None,
        })
    }

    async fn await_server_header(
        transport: &mut LineTransport<S>,
    ) -> SessionResult<(Version, Version)> {
        let mut empty_reads = 0;
        loop {
            match transport.readline(Some(BANNER_READ_TIMEOUT)).await {
                Ok(LineResult::Line(line)) => {
                    empty_reads = 0;
                    match parse_server_banner(&line) {
                        Some((vmin, vmax)) => {
                            let min = vmin
                                .parse()
                                .map_err(|_| SessionError::MalformedHeader(line.clone()))?;
                            let max = vmax
                                .parse()
                                .map_err(|_| SessionError::MalformedHeader(line.clone()))?;
                            return Ok((min, max));
                        }
                        None => debug!(%line, "discarding pre-banner text"),
                    }
                }
                Ok(LineResult::Empty) => {
                    empty_reads += 1;
                    if empty_reads >= BANNER_EMPTY_BUDGET {
                        return Err(SessionError::HandshakeTimeout(
                            "server version banner".to_string(),
                        ));
                    }
                }
                Ok(LineResult::Closed) => return Err(SessionError::Closed),
                Err(e) => return Err(from_transport_closed(e)),
            }
        }
    }

    /// Drains whatever text is buffered right after the client key is
    /// sent, stopping as soon as a full grace window passes with nothing
    /// further arriving (§9 supplement 2). Genuine catalog lines are
    /// expected to follow the server's own processing delay, not arrive
    /// inside this window; callers that drive the handshake over a
    /// near-zero-latency stream (e.g. an in-memory duplex in tests) must
    /// give the server a moment before it starts writing catalog lines.
    async fn drain_buffered_lines(transport: &mut LineTransport<S>) -> SessionResult<()> {
        loop {
            match transport.readline(Some(DRAIN_TIMEOUT)).await {
                Ok(LineResult::Empty) => return Ok(()),
                Ok(LineResult::Line(line)) => {
                    trace!(%line, "draining stray line before catalog exchange");
                }
                Ok(LineResult::Closed) => return Err(SessionError::Closed),
                Err(e) => return Err(from_transport_closed(e)),
            }
        }
    }

    /// Collects `mcp-negotiate-can` lines until `mcp-negotiate-end`
    /// (§4.3 "CollectingCatalog").
    async fn collect_catalog(
        transport: &mut LineTransport<S>,
        auth: &str,
    ) -> SessionResult<Catalog> {
        let mut catalog = Catalog::new();
        let deadline = Instant::now() + CATALOG_BUDGET;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::HandshakeTimeout("package catalog".to_string()));
            }
            match transport.readline(Some(remaining)).await {
                Ok(LineResult::Line(line)) => match tokenize(&line) {
                    Token::Header(h) if h.auth == auth && h.tag == "mcp-negotiate-can" => {
                        if let Some(entry) = parse_catalog_entry(&h) {
                            catalog.insert(entry);
                        } else {
                            warn!(%line, "malformed mcp-negotiate-can line, ignoring");
                        }
                    }
                    Token::Header(h) if h.auth == auth && h.tag == "mcp-negotiate-end" => {
                        return Ok(catalog);
                    }
                    _ => trace!(%line, "ignoring non-catalog line during handshake"),
                },
                Ok(LineResult::Empty) => continue,
                Ok(LineResult::Closed) => return Err(SessionError::Closed),
                Err(e) => return Err(from_transport_closed(e)),
            }
        }
    }

    #[must_use]
    pub fn auth(&self) -> &str {
        &self.auth
    }

    #[must_use]
    pub fn server_version_range(&self) -> (&Version, &Version) {
        (&self.server_min, &self.server_max)
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn negotiated(&self) -> &NegotiatedSet {
        &self.negotiated
    }

    /// Reads up to `max_bytes` of raw text from the underlying transport
    /// (§6 "Session-level public operations", transport facade). Mixing
    /// this with `readline`/`process` after the handshake is the caller's
    /// responsibility to reason about (§3 residual-buffer invariant).
    pub async fn read(
        &mut self,
        max_bytes: usize,
        timeout: Option<Duration>,
    ) -> SessionResult<mcp_transport::ReadResult> {
        self.transport.read(max_bytes, timeout).await.map_err(from_transport_closed)
    }

    /// Reads the next buffered line from the underlying transport (§6
    /// transport facade). Most callers should prefer `process`, which
    /// also performs MCP framing and auth/negotiation filtering.
    pub async fn readline(&mut self, timeout: Option<Duration>) -> SessionResult<LineResult> {
        self.transport.readline(timeout).await.map_err(from_transport_closed)
    }

    /// Writes raw text to the underlying transport (§6 transport facade).
    /// Most callers should prefer `call`, which also performs MCP framing.
    pub async fn write(&mut self, payload: &str) -> SessionResult<()> {
        self.transport.write(payload).await.map_err(SessionError::WriteError)
    }

    /// Declares the packages this client will use (§4.3 "`negotiate`").
    /// May only be called once per session. `mcp-negotiate` itself is
    /// always added to the negotiated set, and is also advertised with its
    /// own `-can` line when the server's catalog lists it (mirroring a
    /// real MUCK's expectation that the client echoes back every package
    /// it intends to rely on, `mcp-negotiate` included).
    pub async fn negotiate(&mut self, requested: Vec<PackageRequest>) -> SessionResult<()> {
        if !self.negotiated.is_empty() {
            return Err(SessionError::AlreadyNegotiated);
        }
        self.negotiated.insert("mcp-negotiate");

        let mut accepted = Vec::with_capacity(requested.len() + 1);
        if let Some(entry) = self.catalog.get("mcp-negotiate") {
            accepted.push((
                entry.name.clone(),
                entry.server_min_version.clone(),
                entry.server_max_version.clone(),
            ));
        }
        for request in requested {
            let (name, lo, hi) = match request {
                PackageRequest::WithRange(name, lo, hi) => {
                    if !self.catalog.contains(&name) {
                        return Err(SessionError::UnknownPackage(name));
                    }
                    (name, lo, hi)
                }
                PackageRequest::Name(name) => {
                    let entry = self
                        .catalog
                        .get(&name)
                        .ok_or_else(|| SessionError::UnknownPackage(name.clone()))?;
                    (
                        name,
                        entry.server_min_version.clone(),
                        entry.server_max_version.clone(),
                    )
                }
            };
            accepted.push((name, lo, hi));
        }

        for (name, lo, hi) in &accepted {
            let line = format!(
                "#$#mcp-negotiate-can {} package: \"{}\" min-version: \"{lo}\" max-version: \"{hi}\"\r\n",
                self.auth,
                escape(name),
            );
            self.transport
                .write(&line)
                .await
                .map_err(SessionError::WriteError)?;
            self.negotiated.insert(name.clone());
        }

        let end_line = format!("#$#mcp-negotiate-end {}\r\n", self.auth);
        self.transport
            .write(&end_line)
            .await
            .map_err(SessionError::WriteError)?;
        Ok(())
    }

    /// Issues an outbound call (§4.3 "`call`"). Auto-negotiates `package`
    /// (optionally within `range`) if nothing has been negotiated yet.
    pub async fn call(
        &mut self,
        package: &str,
        message: Option<&str>,
        arguments: Vec<(String, Value)>,
        range: Option<(Version, Version)>,
    ) -> SessionResult<()> {
        if self.negotiated.is_empty() {
            let requested = match range {
                // `Option<(Version, Version)>` already enforces "lo and hi
                // must both be present or both absent" (§4.3 precondition)
                // by construction — there is no state where only one is set.
                Some((lo, hi)) => vec![PackageRequest::WithRange(package.to_string(), lo, hi)],
                None => vec![PackageRequest::Name(package.to_string())],
            };
            self.negotiate(requested).await?;
        } else if !self.negotiated.contains(package) {
            return Err(SessionError::PackageNotNegotiated(package.to_string()));
        }

        let has_list = arguments.iter().any(|(_, v)| v.is_multi());
        let data_tag = has_list.then(generate_token);
        let outbound = Outbound {
            package: package.to_string(),
            message: message.map(str::to_string),
            auth: self.auth.clone(),
            arguments,
            data_tag,
        };
        let line = compose(&outbound).map_err(|e| SessionError::InvalidArguments(e.to_string()))?;
        self.transport
            .write(&line)
            .await
            .map_err(SessionError::WriteError)?;
        Ok(())
    }

    /// Drains currently-buffered inbound material (§4.3 "`process`").
    /// Never fails on malformed or unauthenticated lines — those land in
    /// `unrecognized` instead (§7 "Recovery policy"). If the peer closes
    /// partway through, whatever was already parsed this call is returned
    /// rather than discarded; the transport itself is now closed, so the
    /// next `process`/`call`/`write` reports `Closed`.
    pub async fn process(&mut self) -> SessionResult<ProcessOutcome> {
        let mut outcome = ProcessOutcome::default();
        loop {
            match self.transport.readline(Some(PROCESS_LINE_TIMEOUT)).await {
                Ok(LineResult::Line(line)) => self.process_line(&line, &mut outcome),
                Ok(LineResult::Empty) => {
                    if self.reassembling.is_none() {
                        return Ok(outcome);
                    }
                    // A multi-line body is still in flight: keep polling
                    // until its terminator arrives (documented "may hang
                    // briefly" behavior).
                }
                Ok(LineResult::Closed) => return Ok(outcome),
                Err(e) => return Err(from_transport_closed(e)),
            }
        }
    }

    fn process_line(&mut self, line: &str, outcome: &mut ProcessOutcome) {
        if !line.starts_with("#$#") {
            outcome.unrecognized.push(line.to_string());
            return;
        }
        match tokenize(line) {
            Token::Header(header) => self.process_header(header, line, outcome),
            Token::Continuation(continuation) => {
                self.process_continuation(continuation, line, outcome)
            }
            Token::Terminator(terminator) => self.process_terminator(terminator, line, outcome),
            Token::Malformed { reason, .. } => {
                trace!(%line, %reason, "malformed inbound line");
                outcome.unrecognized.push(line.to_string());
            }
        }
    }

    fn process_header(&mut self, header: Header, raw: &str, outcome: &mut ProcessOutcome) {
        if header.auth != self.auth {
            outcome.unrecognized.push(raw.to_string());
            return;
        }
        let Some((package, message)) = self.resolve_tag(&header.tag) else {
            outcome.unrecognized.push(raw.to_string());
            return;
        };

        let has_list = header.arguments.iter().any(|(_, v)| v.is_multi());
        if has_list {
            let Some(data_tag) = header.data_tag.clone() else {
                outcome.unrecognized.push(raw.to_string());
                return;
            };
            self.reassembling = Some(Reassembling {
                package,
                message,
                parameters: header.arguments,
                data_tag,
            });
        } else {
            outcome
                .results
                .entry(package)
                .or_default()
                .push(InboundMessage {
                    message,
                    parameters: header.arguments,
                });
        }
    }

    fn process_continuation(
        &mut self,
        continuation: Continuation,
        raw: &str,
        outcome: &mut ProcessOutcome,
    ) {
        let matches = self
            .reassembling
            .as_ref()
            .is_some_and(|r| data_tags_match(&r.data_tag, &continuation.data_tag));
        if !matches {
            outcome.unrecognized.push(raw.to_string());
            return;
        }
        let reassembling = self.reassembling.as_mut().expect("checked above");
        if !reassembling.append(&continuation.key, continuation.value) {
            outcome.unrecognized.push(raw.to_string());
        }
    }

    fn process_terminator(&mut self, terminator: Terminator, raw: &str, outcome: &mut ProcessOutcome) {
        let matches = self
            .reassembling
            .as_ref()
            .is_some_and(|r| data_tags_match(&r.data_tag, &terminator.data_tag));
        if !matches {
            outcome.unrecognized.push(raw.to_string());
            return;
        }
        let reassembling = self.reassembling.take().expect("checked above");
        let (package, message) = reassembling.finish();
        outcome.results.entry(package).or_default().push(message);
    }

    /// Finds the longest negotiated package name that `tag` is, or starts
    /// with followed by `-` (§4.3 "`process`" step 2). Exact matches win
    /// over prefix matches regardless of length.
    fn resolve_tag(&self, tag: &str) -> Option<(String, Option<String>)> {
        if self.negotiated.contains(tag) {
            return Some((tag.to_string(), None));
        }
        let mut best: Option<(&str, &str)> = None;
        for name in self.negotiated.iter() {
            if let Some(suffix) = tag.strip_prefix(name).and_then(|r| r.strip_prefix('-')) {
                let better = best.is_none_or(|(best_name, _)| name.len() > best_name.len());
                if better {
                    best = Some((name, suffix));
                }
            }
        }
        best.map(|(name, suffix)| (name.to_string(), Some(suffix.to_string())))
    }

    /// Writes `connect USER PW\r\n` and reads the response line (§6
    /// "`login`"). Returns `false` iff the response (case-insensitively)
    /// contains "either that player does not exist". On success, the
    /// consumed line is pushed back so the caller's next `readline`/
    /// `process` observes it too (typically the MOTD).
    pub async fn login(&mut self, user: &str, password: &str) -> SessionResult<bool> {
        let command = format!("connect {user} {password}\r\n");
        self.transport
            .write(&command)
            .await
            .map_err(SessionError::WriteError)?;

        match self.transport.readline(Some(BANNER_READ_TIMEOUT)).await {
            Ok(LineResult::Line(line)) => {
                let failed = line
                    .to_lowercase()
                    .contains("either that player does not exist");
                if !failed {
                    self.transport.unread_line(line);
                }
                Ok(!failed)
            }
            Ok(LineResult::Empty) => Err(SessionError::HandshakeTimeout(
                "login response".to_string(),
            )),
            Ok(LineResult::Closed) => Err(SessionError::Closed),
            Err(e) => Err(from_transport_closed(e)),
        }
    }

    /// Writes the application-level `QUIT` and closes the transport (§4.3
    /// "`quit`/`close`").
    pub async fn quit(&mut self) -> SessionResult<()> {
        self.transport
            .write("QUIT\r\n")
            .await
            .map_err(SessionError::WriteError)?;
        self.close().await
    }

    /// Idempotent orderly shutdown (§4.3 "`quit`/`close`", §9 item 4: no
    /// bytes are written here, only the transport-level shutdown).
    pub async fn close(&mut self) -> SessionResult<()> {
        if let Err(e) = self.transport.close().await
            && !matches!(e, mcp_transport::TransportError::Closed)
        {
            warn!(error = %e, "error while closing session transport");
        }
        Ok(())
    }
}

fn parse_server_banner(line: &str) -> Option<(String, String)> {
    let body = line.strip_prefix("#$#mcp version: \"")?;
    let (vmin, rest) = body.split_once('"')?;
    let rest = rest.strip_prefix(" to: \"")?;
    let vmax = rest.strip_suffix('"')?;
    Some((vmin.to_string(), vmax.to_string()))
}

fn parse_catalog_entry(header: &Header) -> Option<CatalogEntry> {
    let name = single_arg(header, "package")?;
    let lo = single_arg(header, "min-version")?;
    let hi = single_arg(header, "max-version")?;
    Some(CatalogEntry {
        name: name.to_string(),
        server_min_version: lo.parse().ok()?,
        server_max_version: hi.parse().ok()?,
    })
}

fn single_arg<'a>(header: &'a Header, key: &str) -> Option<&'a str> {
    header.arguments.iter().find_map(|(k, v)| {
        if k != key {
            return None;
        }
        match v {
            Value::Single(s) => Some(s.as_str()),
            Value::Multi(_) => None,
        }
    })
}

/// Generates an opaque printable token for auth keys and data tags.
fn generate_token() -> String {
    format!("{:08X}", fastrand::u32(..))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    fn split(stream: DuplexStream) -> (BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>) {
        let (rd, wr) = tokio::io::split(stream);
        (BufReader::new(rd), wr)
    }

    async fn read_line(reader: &mut BufReader<ReadHalf<DuplexStream>>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    fn extract_between<'a>(line: &'a str, start: &str, end: &str) -> &'a str {
        let after = line.split(start).nth(1).unwrap();
        after.split(end).next().unwrap()
    }

    #[tokio::test]
    async fn handshake_negotiates_and_calls_a_package() {
        let (client, server) = tokio::io::duplex(8192);
        let (mut server_rd, mut server_wr) = split(server);

        let server = tokio::spawn(async move {
            server_wr
                .write_all(b"#$#mcp version: \"2.1\" to: \"2.1\"\r\n")
                .await
                .unwrap();

            let key_line = read_line(&mut server_rd).await;
            let auth = extract_between(&key_line, "authentication-key: \"", "\"").to_string();

            // Let the client's blank-line drain window elapse before any
            // catalog lines arrive, matching real servers that take longer
            // than the grace window to respond (see `drain_buffered_lines`).
            tokio::time::sleep(Duration::from_millis(150)).await;

            server_wr
                .write_all(
                    format!(
                        "#$#mcp-negotiate-can {auth} package: \"org-example\" min-version: \"1.0\" max-version: \"1.0\"\r\n"
                    )
                    .as_bytes(),
                )
                .await
                .unwrap();
            server_wr
                .write_all(format!("#$#mcp-negotiate-end {auth}\r\n").as_bytes())
                .await
                .unwrap();

            let _can = read_line(&mut server_rd).await;
            let _end = read_line(&mut server_rd).await;

            let call_line = read_line(&mut server_rd).await;
            assert!(call_line.starts_with("#$#org-example "));
            assert!(call_line.contains("topic: \"dbref\""));

            auth
        });

        let mut session = Session::from_stream(client).await.unwrap();
        assert!(session.catalog().contains("org-example"));

        session
            .negotiate(vec![PackageRequest::Name("org-example".to_string())])
            .await
            .unwrap();
        session
            .call(
                "org-example",
                None,
                vec![("topic".to_string(), Value::Single("dbref".to_string()))],
                None,
            )
            .await
            .unwrap();

        // Only join the server now: it is parked reading the negotiate/call
        // lines written just above, so joining any earlier would deadlock.
        let auth = server.await.unwrap();
        assert_eq!(session.auth(), auth);
    }

    #[tokio::test]
    async fn server_version_range_outside_supported_is_rejected() {
        let (client, server) = tokio::io::duplex(4096);
        let (_server_rd, mut server_wr) = split(server);

        tokio::spawn(async move {
            server_wr
                .write_all(b"#$#mcp version: \"1.0\" to: \"1.0\"\r\n")
                .await
                .unwrap();
        });

        let result = Session::from_stream(client).await;
        assert!(matches!(
            result,
            Err(SessionError::UnsupportedProtocol { .. })
        ));
    }

    #[tokio::test]
    async fn process_reassembles_a_multiline_response_with_zero_prefixed_echo() {
        let (client, server) = tokio::io::duplex(8192);
        let (mut server_rd, mut server_wr) = split(server);

        let server = tokio::spawn(async move {
            server_wr
                .write_all(b"#$#mcp version: \"2.1\" to: \"2.1\"\r\n")
                .await
                .unwrap();
            let key_line = read_line(&mut server_rd).await;
            let auth = extract_between(&key_line, "authentication-key: \"", "\"").to_string();
            tokio::time::sleep(Duration::from_millis(150)).await;

            server_wr
                .write_all(
                    format!(
                        "#$#mcp-negotiate-can {auth} package: \"org-fuzzball-help\" min-version: \"1.0\" max-version: \"1.0\"\r\n"
                    )
                    .as_bytes(),
                )
                .await
                .unwrap();
            server_wr
                .write_all(format!("#$#mcp-negotiate-end {auth}\r\n").as_bytes())
                .await
                .unwrap();
            let _can = read_line(&mut server_rd).await;
            let _end = read_line(&mut server_rd).await;

            server_wr
                .write_all(
                    format!(
                        "#$#org-fuzzball-help-entry {auth} text*: \"\" _data-tag: \"0T1\"\r\n"
                    )
                    .as_bytes(),
                )
                .await
                .unwrap();
            server_wr
                .write_all(b"#$#* T1 text: line one\r\n")
                .await
                .unwrap();
            server_wr
                .write_all(b"#$#* T1 text: line two\r\n")
                .await
                .unwrap();
            server_wr
                .write_all(b"#$#: T1\r\n")
                .await
                .unwrap();
        });

        let mut session = Session::from_stream(client).await.unwrap();
        session
            .negotiate(vec![PackageRequest::Name(
                "org-fuzzball-help".to_string(),
            )])
            .await
            .unwrap();

        // The server is parked reading the negotiate lines just written,
        // then writes the multi-line reassembly body; join it before
        // reading so `process` has everything buffered already.
        server.await.unwrap();

        let outcome = session.process().await.unwrap();
        let messages = outcome.results.get("org-fuzzball-help").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].parameters,
            vec![(
                "text".to_string(),
                Value::Multi(vec!["line one".to_string(), "line two".to_string()])
            )]
        );
        assert!(outcome.unrecognized.is_empty());
    }

    #[tokio::test]
    async fn process_routes_unrecognized_auth_to_the_discard_channel() {
        let (client, server) = tokio::io::duplex(8192);
        let (mut server_rd, mut server_wr) = split(server);

        let server = tokio::spawn(async move {
            server_wr
                .write_all(b"#$#mcp version: \"2.1\" to: \"2.1\"\r\n")
                .await
                .unwrap();
            let key_line = read_line(&mut server_rd).await;
            let auth = extract_between(&key_line, "authentication-key: \"", "\"").to_string();
            tokio::time::sleep(Duration::from_millis(150)).await;

            server_wr
                .write_all(format!("#$#mcp-negotiate-end {auth}\r\n").as_bytes())
                .await
                .unwrap();

            // A header carrying a foreign auth key must never be accepted
            // as this session's own traffic.
            server_wr
                .write_all(b"#$#org-example-ping NOT-OUR-AUTH topic: \"dbref\"\r\n")
                .await
                .unwrap();
        });

        let mut session = Session::from_stream(client).await.unwrap();
        server.await.unwrap();

        let outcome = session.process().await.unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.unrecognized.len(), 1);
        assert!(outcome.unrecognized[0].contains("NOT-OUR-AUTH"));
    }
}
