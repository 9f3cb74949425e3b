//! Connection Handler Module
//!
//! This module owns the request-processing loop for one client connection.
//! Each accepted socket gets its own handler task that reassembles the
//! inbound byte stream into discrete HTTP requests and answers them in
//! arrival order.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Frame one HTTP request  │◄┼──┐
//!    │  └───────────┬─────────────┘ │  │
//!    │              │               │  │
//!    │              ▼               │  │ more complete
//!    │  ┌─────────────────────────┐ │  │ requests buffered
//!    │  │ Dispatch to handler     │ │  │ (pipelining)
//!    │  └───────────┬─────────────┘ │  │
//!    │              │               │  │
//!    │              ▼               │  │
//!    │  ┌─────────────────────────┐ │  │
//!    │  │ Send response           │─┼──┘
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / protocol violation / reaper eviction
//!        │
//!        ▼
//! 5. Handler task ends, transport released
//! ```
//!
//! ## Buffer Management
//!
//! Incoming data accumulates in a BytesMut buffer because TCP is a stream
//! protocol: a read may deliver a partial request, or several pipelined
//! requests at once. The drain loop keeps framing requests off the front of
//! the buffer until it is empty or a frame is incomplete. The buffer may
//! grow past its initial reservation, but never past
//! [`RECEIVE_BUFFER_LIMIT`] while a request is still incomplete; exceeding
//! that ceiling answers `413 Payload Too Large` and closes the connection.

use crate::connection::registry::{ConnectionRegistry, ConnectionState};
use crate::handler::RequestHandler;
use crate::protocol::{
    header, serialize, Environment, RequestParser, Response, MAX_CONTENT_SIZE,
};
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Hard ceiling for the receive buffer: the parser's content limit plus a
/// 10% margin so header-heavy but otherwise valid requests are not rejected
/// early.
pub const RECEIVE_BUFFER_LIMIT: usize = MAX_CONTENT_SIZE + MAX_CONTENT_SIZE / 10;

/// Initial buffer capacity, sized so typical requests never reallocate
const INITIAL_BUFFER_SIZE: usize = 1024 * 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests processed
    pub requests_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Outcome of one pass over the receive buffer.
enum Drain {
    /// All complete requests answered; await more bytes
    Continue,
    /// A protocol violation was answered; the connection must close
    Close,
}

/// Handles a single client connection.
///
/// Generic over the transport so the drain loop can be exercised against
/// in-memory streams in tests; production code hands it a `TcpStream`.
pub struct ConnectionHandler<S> {
    /// The transport for this connection, exclusively owned
    stream: BufWriter<S>,

    /// Local and peer addresses, passed through to the request handler
    env: Environment,

    /// Buffer for incoming data; consumed from the front, appended at the tail
    buffer: BytesMut,

    /// Ceiling the buffer may not exceed while a request is incomplete
    buffer_limit: usize,

    /// The application handler (shared across connections)
    request_handler: Arc<dyn RequestHandler>,

    /// Liveness state shared with the registry and the reaper
    state: Arc<ConnectionState>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The transport for this connection
    /// * `env` - Local and peer addresses of the transport
    /// * `request_handler` - The application handler producing responses
    /// * `state` - The registry entry for this connection
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        env: Environment,
        request_handler: Arc<dyn RequestHandler>,
        state: Arc<ConnectionState>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            env,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            buffer_limit: RECEIVE_BUFFER_LIMIT,
            request_handler,
            state,
            stats,
        }
    }

    /// Shrinks the buffer ceiling so the overflow path is reachable without
    /// megabyte payloads.
    #[cfg(test)]
    fn set_buffer_limit(&mut self, limit: usize) {
        self.buffer_limit = limit;
    }

    /// Runs the connection to completion.
    ///
    /// Serves requests until the client disconnects, a protocol violation
    /// forces closure, or the reaper requests eviction. The transport is
    /// released on every exit path.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(peer = %self.env.peer_addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(peer = %self.env.peer_addr, "Connection closed"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(peer = %self.env.peer_addr, "Client disconnected")
                }
                ConnectionError::Io(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(peer = %self.env.peer_addr, "Connection reset by client")
                }
                _ => warn!(peer = %self.env.peer_addr, error = %e, "Connection error"),
            },
        }

        self.state.mark_closed();
        self.stats.connection_closed();
        result
    }

    /// The main read-drain loop.
    ///
    /// Purely reactive: each iteration waits for readable bytes (or an
    /// eviction request), appends them to the buffer, and drains every
    /// complete request already buffered.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let n = tokio::select! {
                read = self.stream.get_mut().read_buf(&mut self.buffer) => {
                    // A failed read is fatal: no response, just release the
                    // transport. The buffer only ever grows by the bytes
                    // actually obtained, so a short read leaves no garbage
                    // length behind.
                    read?
                }
                _ = self.state.close_requested() => {
                    debug!(peer = %self.env.peer_addr, "Eviction requested, closing connection");
                    return Ok(());
                }
            };

            if n == 0 {
                return Err(ConnectionError::ClientDisconnected);
            }

            self.state.touch();
            self.stats.add_bytes_read(n);
            trace!(peer = %self.env.peer_addr, bytes = n, "Received data");

            if let Drain::Close = self.drain_requests().await? {
                return Ok(());
            }
        }
    }

    /// Frames and answers every complete request at the front of the buffer.
    ///
    /// Draining in a loop rather than one request per read is what makes
    /// keep-alive pipelining work: a client may have sent several requests
    /// before we read any of them.
    async fn drain_requests(&mut self) -> Result<Drain, ConnectionError> {
        while !self.buffer.is_empty() {
            match RequestParser::parse(&self.buffer) {
                Ok(Some((request, frame_size))) => {
                    let mut response = self.request_handler.handle(&request, &self.env);

                    let codings = request.header(header::ACCEPT_ENCODING).unwrap_or_default();
                    if accepts_gzip_encoding(codings) {
                        // Eligibility marker only; compression itself is the
                        // serving layer's concern.
                        response.set_header(header::CONTENT_ENCODING, "gzip");
                    }
                    response.set_header(header::CONNECTION, "keep-alive");

                    self.send_response(&response).await?;

                    self.buffer.advance(frame_size);
                    self.stats.request_processed();
                    trace!(
                        peer = %self.env.peer_addr,
                        consumed = frame_size,
                        remaining = self.buffer.len(),
                        "Request answered"
                    );
                }
                Ok(None) => {
                    // Incomplete: either wait for more bytes or, past the
                    // ceiling, refuse to buffer any further.
                    if self.buffer.len() > self.buffer_limit {
                        warn!(
                            peer = %self.env.peer_addr,
                            buffered = self.buffer.len(),
                            limit = self.buffer_limit,
                            "Request exceeds size limit, closing connection"
                        );
                        self.send_refusal(413, "Payload Too Large").await?;
                        return Ok(Drain::Close);
                    }
                    break;
                }
                Err(e) => {
                    warn!(
                        peer = %self.env.peer_addr,
                        error = %e,
                        "Bad request, closing connection"
                    );
                    self.send_refusal(400, "Bad Request").await?;
                    return Ok(Drain::Close);
                }
            }
        }

        Ok(Drain::Continue)
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = serialize(response);

        self.state.set_outbound_pending(true);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.state.set_outbound_pending(false);

        // A completed flush counts as activity.
        self.state.touch();

        self.stats.add_bytes_written(bytes.len());
        trace!(
            peer = %self.env.peer_addr,
            status = response.status,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }

    /// Sends a protocol-violation response carrying `Connection: close`.
    async fn send_refusal(&mut self, status: u16, reason: &str) -> Result<(), ConnectionError> {
        let mut response = Response::new(status, reason);
        response.set_header(header::CONNECTION, "close");
        self.send_response(&response).await
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,
}

/// Decides whether the peer accepts gzip-coded responses.
///
/// Implements RFC 7231 §5.3.4 (Accept-Encoding) restricted to the two
/// codings this server cares about: `gzip` and the `*` wildcard. A quality
/// value of zero is an explicit refusal, and a malformed quality suffix is
/// treated as refusal rather than acceptance.
///
/// # Example
///
/// ```
/// use emberhttp::connection::accepts_gzip_encoding;
///
/// assert!(accepts_gzip_encoding("gzip"));
/// assert!(accepts_gzip_encoding("deflate, *;q=0.3"));
/// assert!(!accepts_gzip_encoding("gzip;q=0"));
/// ```
pub fn accepts_gzip_encoding(codings: &str) -> bool {
    // [rfc7231] 5.3.4. Accept-Encoding
    let stripped: String = codings
        .chars()
        .filter(|c| *c != ' ' && *c != '\t')
        .collect();
    let list: Vec<&str> = stripped.split(',').filter(|s| !s.is_empty()).collect();
    if list.is_empty() {
        return false;
    }

    is_coding_available(&list, "gzip") || is_coding_available(&list, "*")
}

/// Scans for the first entry starting with `encoding` and evaluates it.
///
/// Only that entry decides: a bad or zero q-value does not fall through to
/// later entries for the same coding.
fn is_coding_available(list: &[&str], encoding: &str) -> bool {
    for entry in list {
        if !entry.starts_with(encoding) {
            continue;
        }

        // without quality values
        if *entry == encoding {
            return true;
        }

        // [rfc7231] 5.3.1. Quality Values: the value starts right after
        // ";q=", three bytes past the coding token
        return match entry.get(encoding.len() + 3..) {
            Some(qvalue) => matches!(qvalue.parse::<f64>(), Ok(q) if q > 0.0),
            None => false,
        };
    }
    false
}

/// Resolves the local and peer addresses of an accepted socket.
fn connection_env(stream: &TcpStream) -> std::io::Result<Environment> {
    Ok(Environment::new(stream.local_addr()?, stream.peer_addr()?))
}

/// Handles a client connection end to end.
///
/// This is a convenience function that registers the connection, runs a
/// `ConnectionHandler` to completion and unregisters it afterwards.
///
/// # Arguments
///
/// * `stream` - The accepted TCP stream
/// * `request_handler` - The application handler producing responses
/// * `registry` - The live-connection registry the reaper scans
/// * `stats` - Shared connection statistics
pub async fn handle_connection(
    stream: TcpStream,
    request_handler: Arc<dyn RequestHandler>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<ConnectionStats>,
) {
    let env = match connection_env(&stream) {
        Ok(env) => env,
        Err(e) => {
            debug!(error = %e, "Could not resolve connection addresses");
            return;
        }
    };

    let state = registry.register(env.peer_addr);
    let id = state.id();

    let handler = ConnectionHandler::new(stream, env, request_handler, state, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(peer = %env.peer_addr, error = %e, "Connection ended with error");
            }
        }
    }

    registry.remove(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EchoHandler;
    use crate::protocol::Request;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn test_env() -> Environment {
        Environment::new("127.0.0.1:8080".parse().unwrap(), peer())
    }

    /// Spawns a connection handler over an in-memory stream.
    fn spawn_duplex(
        request_handler: Arc<dyn RequestHandler>,
        buffer_limit: Option<usize>,
    ) -> (DuplexStream, JoinHandle<Result<(), ConnectionError>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let registry = ConnectionRegistry::new();
        let state = registry.register(peer());

        let mut handler = ConnectionHandler::new(
            server,
            test_env(),
            request_handler,
            state,
            Arc::new(ConnectionStats::new()),
        );
        if let Some(limit) = buffer_limit {
            handler.set_buffer_limit(limit);
        }

        (client, tokio::spawn(handler.run()))
    }

    fn path_handler() -> Arc<dyn RequestHandler> {
        Arc::new(|request: &Request, _: &Environment| Response::text(request.path.clone()))
    }

    /// Response the path handler produces for a two-byte path.
    fn expected_response(path: &str, extra_headers: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\n\
             connection: keep-alive\r\n\
             {extra_headers}\
             content-type: text/plain; charset=utf-8\r\n\
             content-length: {}\r\n\
             \r\n\
             {path}",
            path.len()
        )
    }

    async fn read_exactly(client: &mut DuplexStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        client.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_single_request_gets_keep_alive_response() {
        let (mut client, _task) = spawn_duplex(path_handler(), None);

        client
            .write_all(b"GET /hi HTTP/1.1\r\nhost: localhost\r\n\r\n")
            .await
            .unwrap();

        let expected = expected_response("/hi", "");
        let got = read_exactly(&mut client, expected.len()).await;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_chunk_boundaries_do_not_change_outcome() {
        let (mut client, _task) = spawn_duplex(path_handler(), None);

        // Deliver the request one byte at a time across many reads.
        for byte in b"GET /hi HTTP/1.1\r\nhost: localhost\r\n\r\n" {
            client.write_all(&[*byte]).await.unwrap();
        }

        let expected = expected_response("/hi", "");
        let got = read_exactly(&mut client, expected.len()).await;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_pipelined_requests_answered_in_order() {
        let (mut client, _task) = spawn_duplex(path_handler(), None);

        // Both requests arrive in a single write; one drain answers both.
        client
            .write_all(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let expected = format!(
            "{}{}",
            expected_response("/a", ""),
            expected_response("/b", "")
        );
        let got = read_exactly(&mut client, expected.len()).await;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_gzip_acceptance_marks_response() {
        let (mut client, _task) = spawn_duplex(path_handler(), None);

        client
            .write_all(b"GET /hi HTTP/1.1\r\naccept-encoding: gzip\r\n\r\n")
            .await
            .unwrap();

        let expected = expected_response("/hi", "content-encoding: gzip\r\n");
        let got = read_exactly(&mut client, expected.len()).await;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_gzip_refusal_leaves_response_unmarked() {
        let (mut client, _task) = spawn_duplex(path_handler(), None);

        client
            .write_all(b"GET /hi HTTP/1.1\r\naccept-encoding: gzip;q=0\r\n\r\n")
            .await
            .unwrap();

        let expected = expected_response("/hi", "");
        let got = read_exactly(&mut client, expected.len()).await;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_bad_request_answered_and_closed() {
        let (mut client, task) = spawn_duplex(path_handler(), None);

        client.write_all(b"NONSENSE\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("connection: close\r\n"));
        assert!(matches!(task.await.unwrap(), Ok(())));
    }

    #[tokio::test]
    async fn test_buffer_at_ceiling_is_tolerated() {
        let limit = 256;
        let (mut client, _task) = spawn_duplex(path_handler(), Some(limit));

        // Exactly the ceiling, still incomplete: no response may be sent.
        client.write_all(&vec![b'X'; limit]).await.unwrap();

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_millis(100), client.read(&mut buf)).await;
        assert!(read.is_err(), "no response expected at the ceiling");
    }

    #[tokio::test]
    async fn test_buffer_over_ceiling_answers_413_and_closes() {
        let limit = 256;
        let (mut client, task) = spawn_duplex(path_handler(), Some(limit));

        client.write_all(&vec![b'X'; limit + 1]).await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(text.contains("connection: close\r\n"));
        assert!(matches!(task.await.unwrap(), Ok(())));
    }

    #[tokio::test]
    async fn test_client_disconnect_ends_task() {
        let (client, task) = spawn_duplex(path_handler(), None);
        drop(client);

        assert!(matches!(
            task.await.unwrap(),
            Err(ConnectionError::ClientDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_request_body_reaches_handler() {
        let handler = Arc::new(|request: &Request, _: &Environment| {
            Response::text(format!("len={}", request.body.len()))
        });
        let (mut client, _task) = spawn_duplex(handler, None);

        client
            .write_all(b"POST /upload HTTP/1.1\r\ncontent-length: 4\r\n\r\nwxyz")
            .await
            .unwrap();

        let expected = expected_response("len=4", "");
        let got = read_exactly(&mut client, expected.len()).await;
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_over_tcp_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let stats = Arc::new(ConnectionStats::new());

        let registry_clone = Arc::clone(&registry);
        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler: Arc<dyn RequestHandler> = Arc::new(EchoHandler);
                tokio::spawn(handle_connection(
                    stream,
                    handler,
                    Arc::clone(&registry_clone),
                    Arc::clone(&stats_clone),
                ));
            }
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /ping HTTP/1.1\r\nhost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut buf = [0u8; 512];
        let n = client.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("connection: keep-alive\r\n"));
        assert!(text.contains("GET /ping"));
        assert!(stats.requests_processed.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_accepts_gzip_plain_token() {
        assert!(accepts_gzip_encoding("gzip"));
    }

    #[test]
    fn test_accepts_gzip_zero_quality_refused() {
        assert!(!accepts_gzip_encoding("gzip;q=0"));
    }

    #[test]
    fn test_accepts_gzip_positive_quality() {
        assert!(accepts_gzip_encoding("gzip;q=0.5"));
    }

    #[test]
    fn test_accepts_gzip_empty_header() {
        assert!(!accepts_gzip_encoding(""));
    }

    #[test]
    fn test_accepts_gzip_wildcard() {
        assert!(accepts_gzip_encoding("*"));
    }

    #[test]
    fn test_accepts_gzip_other_coding_only() {
        assert!(!accepts_gzip_encoding("deflate"));
    }

    #[test]
    fn test_accepts_gzip_malformed_quality_refused() {
        assert!(!accepts_gzip_encoding("gzip;q=abc"));
    }

    #[test]
    fn test_accepts_gzip_via_wildcard_quality() {
        assert!(accepts_gzip_encoding("deflate, *;q=0.3"));
    }

    #[test]
    fn test_accepts_gzip_whitespace_stripped() {
        assert!(accepts_gzip_encoding("deflate , gzip ; q=0.8"));
    }

    #[test]
    fn test_accepts_gzip_prefix_token_does_not_match() {
        assert!(!accepts_gzip_encoding("gzipper"));
    }

    #[test]
    fn test_accepts_gzip_first_entry_decides() {
        // The zero-quality gzip entry is found first and refuses; the later
        // entry for the same coding is never consulted.
        assert!(!accepts_gzip_encoding("gzip;q=0, gzip"));
    }
}
