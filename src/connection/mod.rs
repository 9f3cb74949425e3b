//! Connection Management Module
//!
//! This module manages individual client connections to the server.
//! Each accepted socket is handled by its own async task, allowing the
//! server to serve thousands of concurrent keep-alive clients efficiently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                      (main.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task          ┌──────────────────┐
//!                        ▼                     │ ConnectionReaper │
//! ┌──────────────────────────────────────┐    │  (background)    │
//! │          ConnectionHandler           │    └────────┬─────────┘
//! │                                      │             │ polls
//! │  ┌───────────┐   ┌────────────────┐  │             ▼
//! │  │ Read bytes│──>│ Frame requests │  │    ┌──────────────────┐
//! │  └───────────┘   └───────┬────────┘  │    │ConnectionRegistry│
//! │                          │           │───>│  (shared state)  │
//! │                          ▼           │    └──────────────────┘
//! │                  ┌───────────────┐   │
//! │                  │ Send response │   │
//! │                  └───────────────┘   │
//! └──────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Buffer Management**: Bounded BytesMut buffer for incoming data
//! - **Pipelining**: Answers multiple requests from a single TCP packet
//! - **Idle Eviction**: The reaper closes quiet keep-alive connections
//! - **Statistics**: Tracks connection and request metrics
//!
//! ## Example
//!
//! ```ignore
//! use emberhttp::connection::{handle_connection, start_reaper};
//! use emberhttp::connection::{ConnectionRegistry, ConnectionStats};
//! use emberhttp::handler::EchoHandler;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = Arc::new(EchoHandler);
//! let _reaper = start_reaper(Arc::clone(&registry));
//!
//! // For each accepted connection...
//! let (stream, _addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, handler, registry, stats));
//! ```

pub mod handler;
pub mod reaper;
pub mod registry;

// Re-export commonly used types
pub use handler::{
    accepts_gzip_encoding, handle_connection, ConnectionError, ConnectionHandler,
    ConnectionStats, RECEIVE_BUFFER_LIMIT,
};
pub use reaper::{start_reaper, ConnectionReaper, ReaperConfig};
pub use registry::{ConnectionRegistry, ConnectionState};
