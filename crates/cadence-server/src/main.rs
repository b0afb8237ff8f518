//! Cadence Server - adaptive review scheduling over HTTP
//!
//! Serves the session, review and progress operations of `cadence-core` as
//! JSON routes on localhost.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use cadence_core::{Config, ReviewService};

/// Command-line overrides on top of the environment configuration
struct Args {
    data_dir: Option<PathBuf>,
    port: Option<u16>,
}

fn usage_error(message: &str) -> ! {
    eprintln!("error: {}", message);
    eprintln!("Usage: cadence-server [--data-dir <PATH>] [--port <PORT>]");
    std::process::exit(1);
}

/// Parse command-line arguments.
/// Exits the process if `--help` or `--version` is requested.
fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        data_dir: None,
        port: None,
    };
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Cadence Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Adaptive review scheduling API (FSRS).");
                println!();
                println!("USAGE:");
                println!("    cadence-server [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --data-dir <PATH>       Custom data directory");
                println!("    --port <PORT>           Port to listen on");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                       Log level filter (e.g., debug, info, warn)");
                println!("    CADENCE_DATA_DIR               Data directory");
                println!("    CADENCE_PORT                   Port to listen on");
                println!("    CADENCE_SESSION_SIZE           Default items per session");
                println!("    CADENCE_REQUEST_RETENTION      FSRS target retention (0-1)");
                println!("    CADENCE_MAX_CONFLICT_RETRIES   Retries for concurrent card updates");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("cadence-server {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--data-dir" => {
                i += 1;
                match args.get(i) {
                    Some(path) => parsed.data_dir = Some(PathBuf::from(path)),
                    None => usage_error("--data-dir requires a path argument"),
                }
            }
            "--port" => {
                i += 1;
                match args.get(i).and_then(|p| p.parse().ok()) {
                    Some(port) => parsed.port = Some(port),
                    None => usage_error("--port requires a port number"),
                }
            }
            arg => usage_error(&format!("unknown argument '{}'", arg)),
        }
        i += 1;
    }

    parsed
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments first (before logging init, so --help/--version work cleanly)
    let args = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
        )
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Cadence Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    if args.data_dir.is_some() {
        config.data_dir = args.data_dir;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let service = match ReviewService::from_config(&config) {
        Ok(s) => {
            info!("Storage initialized successfully");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = cadence_server::api::serve(service, config.port).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Cadence Server shutting down");
}
