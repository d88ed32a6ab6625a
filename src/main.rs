//! Item gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http server ──▶ ItemGateway
//!                                       │
//!                                       ▼
//!                               retry (backoff)
//!                                       │
//!                                       ▼
//!                               circuit breaker
//!                                       │
//!                                       ▼
//!                       ChannelRef ──▶ ItemChannel ─────────▶ item-service
//!                           ▲
//!                           │ swap on failed probe
//!                   connection monitor (every interval)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use item_gateway::config::{load_config, GatewayConfig};
use item_gateway::lifecycle::{spawn_signal_handler, startup, Shutdown};
use item_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "item-gateway", version)]
#[command(about = "REST gateway for the item service", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config: GatewayConfig = load_config(args.config.as_deref())?;

    startup::init_observability(&config.observability, "tower_http=info")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "item-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.target(),
        fail_max = config.breaker.fail_max,
        reset_timeout_secs = config.breaker.reset_timeout_secs,
        max_retries = config.retry.max_retries,
        monitor_interval_secs = config.monitor.interval_secs,
        "Configuration loaded"
    );

    let listener = startup::bind(&config.listener.bind_address).await?;

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, server_shutdown).await?;

    Ok(())
}
