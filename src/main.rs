//! emberhttp - A Lightweight, Embeddable HTTP/1.1 Server
//!
//! This is the main entry point for the standalone emberhttp server.
//! It sets up the TCP listener, the connection registry and reaper, and
//! serves the built-in echo application.

use emberhttp::connection::{handle_connection, ConnectionRegistry, ConnectionStats};
use emberhttp::connection::{ConnectionReaper, ReaperConfig};
use emberhttp::handler::{EchoHandler, RequestHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Seconds of quiet after which a keep-alive connection is evicted
    idle_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: emberhttp::DEFAULT_HOST.to_string(),
            port: emberhttp::DEFAULT_PORT,
            idle_timeout: 7,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--idle-timeout" | "-t" => {
                    if i + 1 < args.len() {
                        config.idle_timeout = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid idle timeout");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --idle-timeout requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("emberhttp version {}", emberhttp::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
emberhttp - A Lightweight, Embeddable HTTP/1.1 Server

USAGE:
    emberhttp [OPTIONS]

OPTIONS:
    -h, --host <HOST>            Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>            Port to listen on (default: 8080)
    -t, --idle-timeout <SECS>    Idle seconds before eviction (default: 7)
    -v, --version                Print version information
        --help                   Print this help message

EXAMPLES:
    emberhttp                          # Start on 127.0.0.1:8080
    emberhttp --port 8081              # Start on port 8081
    emberhttp --host 0.0.0.0           # Listen on all interfaces

CONNECTING:
    Use curl or any HTTP client:
    $ curl http://127.0.0.1:8080/hello
    GET /hello from 127.0.0.1:53412
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
        ███████╗███╗   ███╗██████╗ ███████╗██████╗
        ██╔════╝████╗ ████║██╔══██╗██╔════╝██╔══██╗
        █████╗  ██╔████╔██║██████╔╝█████╗  ██████╔╝
        ██╔══╝  ██║╚██╔╝██║██╔══██╗██╔══╝  ██╔══██╗
        ███████╗██║ ╚═╝ ██║██████╔╝███████╗██║  ██║
        ╚══════╝╚═╝     ╚═╝╚═════╝ ╚══════╝╚═╝  ╚═╝

emberhttp v{} - Lightweight, Embeddable HTTP/1.1 Server
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        emberhttp::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Shared connection bookkeeping
    let registry = Arc::new(ConnectionRegistry::new());
    let stats = Arc::new(ConnectionStats::new());

    // Start the background connection reaper
    let reaper_config = ReaperConfig {
        idle_timeout: Duration::from_secs(config.idle_timeout),
        ..Default::default()
    };
    let _reaper = ConnectionReaper::start(Arc::clone(&registry), reaper_config);

    // The built-in application; embedders supply their own RequestHandler
    let handler: Arc<dyn RequestHandler> = Arc::new(EchoHandler);

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, handler, registry, stats) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let handler = Arc::clone(&handler);
                let registry = Arc::clone(&registry);
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, handler, registry, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
