//! Routing front-end.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ routing engine ──▶ ResolutionResult
//!                                        │    ▲
//!                                        │    └── live Deployment (ArcSwap)
//!                                        ▼             ▲
//!                                   middleware         │ manifest watcher
//!                                                      │
//!     Client Response          redirect / static / ISR / origin / 404
//!     ◀──────────────────────────────────────────────────────────────
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use route_resolver::config::{load_config, RouterConfig};
use route_resolver::deployment::{load_deployment, ManifestWatcher};
use route_resolver::lifecycle::{wait_for_signal, Shutdown};
use route_resolver::observability::{init_logging, init_metrics};
use route_resolver::HttpServer;

#[derive(Parser)]
#[command(name = "route-resolver")]
#[command(about = "Routing front-end for Next.js-style deployments", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("route-resolver v{} starting", env!("CARGO_PKG_VERSION"));

    let manifest_path = PathBuf::from(&config.deployment.manifest_path);
    let deployment = load_deployment(&manifest_path)?;
    tracing::info!(
        build_id = %deployment.build_id,
        base_path = %deployment.base_path,
        rules = deployment.routes.len(),
        pathnames = deployment.pathnames.len(),
        "Deployment loaded"
    );

    // The watcher handle must outlive the server.
    let (_watcher, updates) = if config.deployment.watch {
        let (watcher, updates) = ManifestWatcher::new(&manifest_path);
        (Some(watcher.run()?), updates)
    } else {
        let (_tx, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, deployment);
    let server_task = tokio::spawn(server.run(listener, updates, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
