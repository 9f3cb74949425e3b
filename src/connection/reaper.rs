//! Background Connection Reaper
//!
//! This module implements the eviction side of keep-alive: a background
//! task that periodically scans the connection registry, asks idle
//! connections to close, and prunes entries whose transport is already
//! gone.
//!
//! ## Why Do We Need This?
//!
//! A keep-alive connection stays open between requests by design. Without
//! eviction, a client that silently disappears would pin its socket, its
//! receive buffer and its registry entry forever.
//!
//! ## Design
//!
//! The reaper runs as a Tokio task and:
//! 1. Sleeps for a configurable interval (default: 1s)
//! 2. Wakes up and walks a snapshot of the registry
//! 3. Removes entries whose connection reports `is_closed`
//! 4. Requests closure of entries whose `has_expired(idle_timeout)` is true
//!
//! Eviction is advisory from the connection's point of view: the reaper
//! only delivers a close notification, and the connection task acts on it
//! in its own event loop. A connection with unflushed outbound bytes never
//! reports itself expired, so a response is never cut off mid-flush. A
//! buffered partial request grants no such grace: a client that stops
//! sending mid-frame is evicted once the idle timeout elapses.

use crate::connection::registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the connection reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Interval between registry scans (default: 1s)
    pub interval: Duration,

    /// Idle time after which a quiet connection is evicted (default: 7s)
    pub idle_timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(7),
        }
    }
}

/// A handle to the running connection reaper.
///
/// When this handle is dropped, the reaper task will be stopped.
#[derive(Debug)]
pub struct ConnectionReaper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ConnectionReaper {
    /// Starts the reaper as a background task.
    ///
    /// # Arguments
    ///
    /// * `registry` - The live-connection registry to scan
    /// * `config` - Scan interval and idle timeout
    ///
    /// # Returns
    ///
    /// Returns a handle that can be used to stop the reaper.
    /// The reaper will automatically stop when the handle is dropped.
    pub fn start(registry: Arc<ConnectionRegistry>, config: ReaperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(reaper_loop(registry, config, shutdown_rx));

        info!("Background connection reaper started");

        Self { shutdown_tx }
    }

    /// Stops the reaper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Background connection reaper stopped");
    }
}

impl Drop for ConnectionReaper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main reaper loop.
async fn reaper_loop(
    registry: Arc<ConnectionRegistry>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Connection reaper received shutdown signal");
                    return;
                }
            }
        }

        let mut pruned = 0usize;
        let mut evicted = 0usize;

        for state in registry.snapshot() {
            if state.is_closed() {
                registry.remove(state.id());
                pruned += 1;
            } else if state.has_expired(config.idle_timeout) {
                trace!(
                    peer = %state.peer_addr(),
                    idle_ms = state.idle_time().as_millis(),
                    "Evicting idle connection"
                );
                state.request_close();
                evicted += 1;
            }
        }

        if pruned > 0 || evicted > 0 {
            debug!(
                pruned = pruned,
                evicted = evicted,
                remaining = registry.len(),
                "Reaper pass complete"
            );
        }
    }
}

/// Starts the connection reaper with default configuration.
///
/// This is a convenience function for simple use cases.
pub fn start_reaper(registry: Arc<ConnectionRegistry>) -> ConnectionReaper {
    ConnectionReaper::start(registry, ReaperConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{handle_connection, ConnectionStats};
    use crate::handler::EchoHandler;
    use crate::handler::RequestHandler;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn fast_config() -> ReaperConfig {
        ReaperConfig {
            interval: Duration::from_millis(10),
            idle_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_reaper_prunes_closed_entries() {
        let registry = Arc::new(ConnectionRegistry::new());
        let state = registry.register(peer());
        state.mark_closed();

        let _reaper = ConnectionReaper::start(Arc::clone(&registry), fast_config());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reaper_spares_connections_mid_flush() {
        let registry = Arc::new(ConnectionRegistry::new());
        let state = registry.register(peer());
        state.set_outbound_pending(true);

        let _reaper = ConnectionReaper::start(Arc::clone(&registry), fast_config());
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Unflushed response bytes block expiry no matter the idle time.
        assert_eq!(registry.len(), 1);
        assert!(!state.is_closed());
    }

    #[tokio::test]
    async fn test_reaper_stops_on_drop() {
        let registry = Arc::new(ConnectionRegistry::new());

        {
            let _reaper = ConnectionReaper::start(Arc::clone(&registry), fast_config());
            tokio::time::sleep(Duration::from_millis(30)).await;
            // Reaper is dropped here
        }

        let state = registry.register(peer());
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Nothing scanned the registry, so the idle entry survived.
        assert_eq!(registry.len(), 1);
        assert!(state.has_expired(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_reaper_evicts_idle_tcp_connection() {
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

        let _reaper = ConnectionReaper::start(Arc::clone(&registry), fast_config());

        // Connect and go silent; the reaper must close the socket for us.
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf)).await;

        assert_eq!(read.unwrap().unwrap(), 0, "expected EOF from eviction");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reaper_evicts_half_request_client() {
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

        let _reaper = ConnectionReaper::start(Arc::clone(&registry), fast_config());

        // Send half a request and stall: the buffered partial frame must
        // not keep the connection alive past the idle timeout.
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET /slow HTTP/1.1\r\n").await.unwrap();

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf)).await;

        assert_eq!(read.unwrap().unwrap(), 0, "expected EOF from eviction");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.is_empty());
    }
}
