//! mcp-toolhost: plugin-driven MCP tool server
//!
//! Discovers the built-in tool plugins and serves them to MCP clients over
//! stdio, HTTP, WebSocket or SSE.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use mcp_toolhost::config::{self, Config};
use mcp_toolhost::mcp::transport::{http, sse, websocket, StdioServer, TransportKind};
use mcp_toolhost::mcp::{ProtocolEngine, ServerInfo};
use mcp_toolhost::tools::{builtin_plugins, RegistrySnapshot, ToolRegistry};

/// Plugin-driven MCP tool server.
///
/// Serves tools declared by plugins over the Model Context Protocol.
#[derive(Parser, Debug)]
#[command(name = "mcp-toolhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Transport to serve (overrides the config file)
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Bind address for network transports (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Listen port for network transports (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the discovered tools and any failed plugins, then exit
    #[arg(long)]
    list_tools: bool,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
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

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries stdio protocol frames.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the registry and runs the first discovery pass.
fn build_registry(cfg: &Config) -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new(builtin_plugins())
        .with_disabled_plugins(cfg.tools.disabled_plugins.iter().cloned())
        .with_timeout(cfg.tools.timeout());

    let snapshot = registry.discover();
    for failure in snapshot.failed_plugins() {
        warn!(
            plugin = %failure.plugin,
            tool = ?failure.tool,
            reason = %failure.reason,
            "Plugin failed to load"
        );
    }

    Arc::new(registry)
}

/// Prints the snapshot for `--list-tools`.
fn print_tools(snapshot: &RegistrySnapshot) {
    for tool in snapshot.tools() {
        println!(
            "{:<16} [{:<8}] {:<10} {}",
            tool.name(),
            tool.style().to_string(),
            tool.plugin(),
            tool.description()
        );
    }
    for failure in snapshot.failed_plugins() {
        match &failure.tool {
            Some(tool) => println!("FAILED {} ({tool}): {}", failure.plugin, failure.reason),
            None => println!("FAILED {}: {}", failure.plugin, failure.reason),
        }
    }
}

/// Runs the selected transport to completion.
async fn serve(engine: ProtocolEngine, kind: TransportKind, host: &str, port: Option<u16>) -> std::io::Result<()> {
    let port = port.unwrap_or_default();
    match kind {
        TransportKind::Stdio => StdioServer::new(engine).run().await,
        TransportKind::Http => http::serve(engine, host, port).await,
        TransportKind::Websocket => websocket::serve(engine, host, port).await,
        TransportKind::Sse => sse::serve(engine, host, port).await,
    }
}

/// Entry point for the mcp-toolhost server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting mcp-toolhost server"
    );

    let registry = build_registry(&cfg);

    if args.list_tools {
        print_tools(&registry.snapshot());
        return ExitCode::SUCCESS;
    }

    let kind = args.transport.unwrap_or(cfg.transport.kind);
    let host = args.host.unwrap_or_else(|| cfg.transport.host.clone());
    let port = args.port.or_else(|| cfg.transport.port_for(kind));

    let engine = ProtocolEngine::new(
        registry,
        ServerInfo {
            name: cfg.server.name.clone(),
            version: cfg.server.version.clone(),
        },
    );

    info!(transport = %kind, host = %host, port = ?port, "MCP server ready, waiting for client connection...");

    // Run the server
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(serve(engine, kind, &host, port));

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
