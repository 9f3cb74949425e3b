//! Live Connection Registry
//!
//! Every accepted connection registers a shared [`ConnectionState`] here.
//! The connection task updates it (activity timestamps, pending-byte flags),
//! while the background reaper polls it through the two liveness queries:
//!
//! - [`ConnectionState::has_expired`] - idle longer than the timeout, with
//!   nothing buffered in either direction
//! - [`ConnectionState::is_closed`] - the transport is fully disconnected
//!
//! Both are pure queries. The reaper never reaches into a connection's
//! buffers; when it decides to evict, it calls
//! [`ConnectionState::request_close`] and the connection task observes the
//! notification in its own event loop. The core never terminates itself on
//! a timeout.
//!
//! Expiry gates on unflushed output and idle time only. Bytes already
//! buffered for a partial frame do not count as activity: a client that
//! sends half a request and then goes silent is still evicted once the
//! idle timeout elapses, instead of pinning its socket and buffer forever.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Shared per-connection liveness state.
///
/// The idle clock is monotonic: activity is recorded as milliseconds elapsed
/// since the connection's creation instant, so wall-clock adjustments never
/// expire a live connection.
#[derive(Debug)]
pub struct ConnectionState {
    /// Registry key for this connection
    id: u64,

    /// Remote peer, kept for log messages
    peer_addr: SocketAddr,

    /// Base instant for the idle clock
    epoch: Instant,

    /// Milliseconds since `epoch` at the last byte received or flushed
    idle_since_ms: AtomicU64,

    /// Response bytes have been written but not yet flushed
    outbound_pending: AtomicBool,

    /// The connection task has finished and dropped its transport
    closed: AtomicBool,

    /// Eviction signal from the reaper to the connection task
    close_signal: Notify,
}

impl ConnectionState {
    fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            epoch: Instant::now(),
            idle_since_ms: AtomicU64::new(0),
            outbound_pending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        }
    }

    /// Registry key for this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Resets the idle deadline. Called on every byte received and every
    /// completed flush.
    pub fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.idle_since_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Time since the idle deadline was last reset.
    pub fn idle_time(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.idle_since_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }

    /// Records whether written bytes are still awaiting a flush.
    pub fn set_outbound_pending(&self, pending: bool) {
        self.outbound_pending.store(pending, Ordering::Relaxed);
    }

    /// True only when no written bytes await a flush and the idle time
    /// exceeds `timeout`. Pure query with no side effects.
    ///
    /// Inbound bytes are always read off the socket as soon as they
    /// arrive, and each read resets the idle clock, so there is no unread
    /// inbound state for this query to consult. A buffered partial frame
    /// deliberately does not block expiry.
    pub fn has_expired(&self, timeout: Duration) -> bool {
        !self.outbound_pending.load(Ordering::Relaxed) && self.idle_time() > timeout
    }

    /// True once the connection task has released its transport.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Marks the transport as released. Called by the connection task on
    /// every exit path.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Asks the connection task to shut down. The request is remembered, so
    /// it is not lost if it arrives while the task is mid-drain.
    pub fn request_close(&self) {
        self.close_signal.notify_one();
    }

    /// Resolves when an eviction has been requested.
    pub async fn close_requested(&self) {
        self.close_signal.notified().await;
    }
}

/// The set of live connections, shared between the accept loop and the
/// reaper.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u64, Arc<ConnectionState>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly accepted connection and returns its shared state.
    pub fn register(&self, peer_addr: SocketAddr) -> Arc<ConnectionState> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(ConnectionState::new(id, peer_addr));
        self.connections
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&state));
        state
    }

    /// Removes a connection from the registry.
    pub fn remove(&self, id: u64) {
        self.connections.lock().unwrap().remove(&id);
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered connections, for the reaper's scan.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionState>> {
        self.connections.lock().unwrap().values().cloned().collect()
    }
}
