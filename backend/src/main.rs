//! Plane MCP server.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use plane_mcp::{
    config::{Config, ConfigOverrides, TransportKind},
    create_app,
    logging::{init_logging, ConsoleTarget},
    mcp::{stdio::serve_stdio, McpHandler, ServerIdentity},
    plane::PlaneClient,
    shutdown::install_signal_handler,
    state::AppState,
    tools::PlaneTools,
};

/// Plane MCP - Model Context Protocol server for the Plane project tracker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport to serve
    #[arg(short, long, value_enum, env = "PLANE_MCP_TRANSPORT")]
    transport: Option<TransportKind>,

    /// Port to listen on (HTTP transports)
    #[arg(short, long)]
    port: Option<u16>,

    /// Plane API base URL, e.g. https://plane.example.com/api/v1
    #[arg(long)]
    base_url: Option<String>,

    /// Plane API key
    #[arg(long)]
    api_key: Option<String>,

    /// Plane workspace slug
    #[arg(long)]
    workspace_slug: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            transport: args.transport,
            base_url: args.base_url,
            api_key: args.api_key,
            workspace_slug: args.workspace_slug,
            log_level: args.log_level,
            log_file: args.log_file,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::from_figment(args.into())?;

    // stdout belongs to the protocol in stdio mode
    let console = match config.transport {
        TransportKind::Stdio => ConsoleTarget::Stderr,
        TransportKind::Sse | TransportKind::Http => ConsoleTarget::Stdout,
    };
    let _log_guard = init_logging(
        config.log_level.as_deref(),
        config.log_file.as_deref(),
        console,
    )?;

    info!("Starting Plane MCP server ({} transport)...", config.transport);
    info!("Configuration loaded: {:?}", config);
    if config.plane.api_key.is_empty() {
        warn!("No Plane API key configured; API calls will be rejected by Plane");
    }

    run(config)
}

#[tokio::main]
async fn run(config: Config) -> anyhow::Result<()> {
    let client = PlaneClient::new(config.plane.clone())?;
    let tools = PlaneTools::new(client);
    let handler = Arc::new(McpHandler::new(Arc::new(tools), ServerIdentity::default())?);

    let shutdown = install_signal_handler();

    match config.transport {
        TransportKind::Stdio => {
            serve_stdio(handler, tokio::io::stdin(), tokio::io::stdout(), shutdown).await?;
        }
        TransportKind::Sse | TransportKind::Http => {
            let state = AppState::new(handler, config.transport);
            serve_http(state, config.port, shutdown).await?;
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn serve_http(state: AppState, port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = create_app(state.clone());

    // Bind to 0.0.0.0 to be accessible from all interfaces (Docker, network, etc.)
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    // Closing sessions ends their SSE bodies so in-flight connections can drain
    let shutdown_signal = async move {
        shutdown.cancelled().await;
        state.shutdown();
        info!("Server shutting down");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
