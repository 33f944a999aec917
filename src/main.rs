//! tunnel-edge
//!
//! A small edge server carrying the full correlation stack.
//!
//! ```text
//!     Client ──▶ TraceLayer ──▶ request id ──▶ instance id ──▶ /context
//!                                                          └─▶ /forward/* ──▶ propagation ──▶ upstream
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use tunnel_telemetry::config::{load_config, TelemetryConfig};
use tunnel_telemetry::lifecycle::{shutdown_signal, Shutdown};
use tunnel_telemetry::observability::{logging, metrics};
use tunnel_telemetry::{HttpServer, TelemetryError, TunnelTelemetry};

/// Edge server with tunnel correlation propagation
#[derive(Parser)]
#[command(name = "tunnel-edge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TelemetryConfig::default(),
    };

    let telemetry = TunnelTelemetry::from_config(&config)?;
    logging::init_logging(&config, telemetry.enricher())?;

    tracing::info!(
        service = %telemetry.service_name(),
        environment = %telemetry.environment(),
        instance_id = %telemetry.instance_id(),
        "tunnel-edge v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.metrics.enabled {
        let addr: SocketAddr = config.metrics.address.parse()?;
        metrics::init_metrics(addr).map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = ?config.upstream.address,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, &telemetry);
    let rx = shutdown.subscribe();
    shutdown.trigger_on(shutdown_signal());

    server.run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
