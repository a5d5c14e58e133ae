//! BankrollKings stats server

use anyhow::{Context, Result};
use clap::Parser;
use stats_gateway::{
    connect_store, create_routes, initialize_logging, shutdown_signal, ApiState, DashboardConfig,
    ResourceCatalog,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Serve the NFL stats API
#[derive(Parser)]
#[command(name = "stats-server")]
#[command(about = "BankrollKings NFL stats API server")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config =
        DashboardConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    initialize_logging(&config.logging)?;
    info!("Starting BankrollKings stats server v{}", env!("CARGO_PKG_VERSION"));

    let catalog = ResourceCatalog::standard();
    catalog.validate().context("Invalid resource catalog")?;
    info!("Mounted {} resources under /api", catalog.len());

    let store = connect_store(&config.store).await.context("Failed to connect to stats store")?;
    let state = Arc::new(ApiState::new(store, catalog));
    let routes = create_routes(state);

    let addr = config.server_addr()?;
    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, shutdown_signal())
        .context("Failed to bind server address")?;

    info!("Stats server listening on http://{}", bound);
    server.await;

    info!("Stats server shutdown complete");
    Ok(())
}
