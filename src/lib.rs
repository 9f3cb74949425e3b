//! # emberhttp - A Lightweight, Embeddable HTTP/1.1 Server Core
//!
//! emberhttp is a small HTTP/1.1 server written in Rust, designed to be
//! embedded into a host application that supplies the request handler.
//! It focuses on the hard part of serving HTTP over TCP: correctly framing
//! requests out of a byte stream with no message boundaries, under
//! adversarial input, with bounded memory use and keep-alive pipelining.
//!
//! ## Features
//!
//! - **Streaming Framing**: Incrementally reassembles requests from
//!   partial reads; outcome is independent of chunk boundaries
//! - **Keep-Alive & Pipelining**: Answers every buffered request per read
//!   event, strictly in arrival order
//! - **Bounded Buffering**: The receive buffer may never exceed the
//!   content-size limit plus a 10% header margin; violators get `413`
//! - **Idle Eviction**: A background reaper closes quiet connections
//! - **Content Negotiation**: RFC 7231 `Accept-Encoding` evaluation marks
//!   responses gzip-eligible
//! - **Async I/O**: Built on Tokio for thousands of concurrent connections
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            emberhttp                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Request    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘              │
//! │                           │                                         │
//! │        ┌──────────────────┼──────────────────┐                      │
//! │        ▼                  ▼                  ▼                      │
//! │  ┌───────────┐     ┌────────────┐     ┌────────────┐                │
//! │  │  Request  │     │  Response  │     │ Connection │                │
//! │  │  Parser   │     │ Serializer │     │  Registry  │                │
//! │  └───────────┘     └────────────┘     └─────┬──────┘                │
//! │                                             ▲                      │
//! │                                             │ polls                │
//! │                     ┌───────────────────────┴─────────────────────┐ │
//! │                     │           ConnectionReaper                  │ │
//! │                     │        (Background Tokio Task)              │ │
//! │                     └─────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use emberhttp::connection::{handle_connection, start_reaper};
//! use emberhttp::connection::{ConnectionRegistry, ConnectionStats};
//! use emberhttp::handler::RequestHandler;
//! use emberhttp::protocol::{Environment, Request, Response};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     // The application: any Fn(&Request, &Environment) -> Response works
//!     let app: Arc<dyn RequestHandler> =
//!         Arc::new(|req: &Request, _env: &Environment| {
//!             Response::text(format!("hello from {}", req.path))
//!         });
//!
//!     // Shared connection bookkeeping
//!     let registry = Arc::new(ConnectionRegistry::new());
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     // Evict idle keep-alive connections in the background
//!     let _reaper = start_reaper(Arc::clone(&registry));
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     loop {
//!         let (stream, _addr) = listener.accept().await.unwrap();
//!         tokio::spawn(handle_connection(
//!             stream,
//!             Arc::clone(&app),
//!             Arc::clone(&registry),
//!             Arc::clone(&stats),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: HTTP/1.1 request framing and response serialization
//! - [`connection`]: Per-connection loop, registry, and idle reaper
//! - [`handler`]: The `RequestHandler` seam between core and application
//!
//! ## Design Highlights
//!
//! ### Framing Under Adversarial Input
//!
//! The parser only ever inspects a buffer prefix and reports one of three
//! verdicts: a complete frame with its exact byte length, "incomplete", or
//! "malformed". Every error path closes the connection: one bad frame
//! invalidates trust in the rest of the stream.
//!
//! ### Single Writer Per Connection
//!
//! All buffer mutation and collaborator calls for one connection happen on
//! its own task. Responses therefore ship strictly in request order, which
//! is what makes pipelining safe.
//!
//! ### Advisory Expiry
//!
//! The connection core never terminates itself on a timeout. It exposes
//! pure liveness queries, and the reaper decides; a connection with
//! unflushed response bytes is never considered expired, while a client
//! that sends half a request and goes silent is evicted like any other
//! idle peer.

pub mod connection;
pub mod handler;
pub mod protocol;

// Re-export commonly used types for convenience
pub use connection::{
    accepts_gzip_encoding, handle_connection, start_reaper, ConnectionError, ConnectionHandler,
    ConnectionReaper, ConnectionRegistry, ConnectionStats, ReaperConfig,
};
pub use handler::{EchoHandler, RequestHandler};
pub use protocol::{
    parse_request, serialize, Environment, ParseError, Request, RequestParser, Response,
    MAX_CONTENT_SIZE,
};

/// The default port emberhttp listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host emberhttp binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of emberhttp
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
