//! chroma-mcp-server: MCP server exposing a Chroma vector database
//!
//! Serves JSON-RPC 2.0 over HTTP POST and an SSE endpoint stream on `/` and
//! `/mcp`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use chroma_mcp_server::backend;
use chroma_mcp_server::config::{self, BackendKind};
use chroma_mcp_server::error::ServerError;
use chroma_mcp_server::mcp::server::McpServer;
use chroma_mcp_server::mcp::transport::{self, AppState};

/// MCP server exposing a Chroma vector database.
///
/// Offers `chroma.query` and `chroma.add_texts` as MCP tools over JSON-RPC
/// 2.0 on HTTP, with an SSE stream announcing the POST endpoint.
#[derive(Parser, Debug)]
#[command(name = "chroma-mcp-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (defaults to ~/.chroma-mcp-server/config.json)
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Vector store to use (chroma or memory), overriding the configuration
    #[arg(long, value_name = "BACKEND")]
    backend: Option<BackendKind>,

    /// More logging: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log errors only
    #[arg(short, long)]
    quiet: bool,
}

/// Picks the log level: `-q` wins, then `-v`, then `logging.level`.
#[allow(clippy::match_same_arms)]
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Logs go to stderr; `RUST_LOG` directives are layered on top of `level`.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Binds the listener and serves until shutdown.
async fn run(address: String, state: AppState) -> Result<(), ServerError> {
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind { address, source })?;

    transport::serve(listener, state).await
}

/// Entry point for the chroma-mcp-server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if let Some(path) = config_path {
                eprintln!("\nWhile loading: {}", path.display());
            } else if let Some(default_path) = config::default_config_path() {
                eprintln!("\nDefault config location: {}", default_path.display());
            }
            return ExitCode::FAILURE;
        }
    };

    if let Some(backend) = args.backend {
        cfg.backend = backend;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "chroma-mcp-server {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %cfg.backend,
        "Starting chroma-mcp-server"
    );

    let store = match backend::from_config(&cfg) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to create vector store");
            return ExitCode::FAILURE;
        }
    };

    // Create MCP server
    let server = Arc::new(McpServer::new(store));
    let state = AppState::new(
        server,
        Duration::from_secs(cfg.server.sse_keepalive_secs),
    )
    .with_max_body_bytes(cfg.server.max_body_bytes);

    let address = args
        .bind
        .map_or_else(|| cfg.server.bind_address(), |addr| addr.to_string());

    // Run the server
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(address, state));

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
