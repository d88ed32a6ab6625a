//! Item service: the RPC backend behind the gateway.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use item_gateway::config::{load_config, ServiceConfig};
use item_gateway::lifecycle::{spawn_signal_handler, startup, Shutdown};
use item_gateway::store::MemoryStore;
use item_gateway::{ItemService, RpcServer};

#[derive(Parser)]
#[command(name = "item-service", version)]
#[command(about = "Item service RPC backend", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config: ServiceConfig = load_config(args.config.as_deref())?;

    startup::init_observability(&config.observability, "tower_http=info")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "item-service starting");

    let service = if config.store.enabled {
        tracing::info!("In-process record store ready");
        ItemService::new(Arc::new(MemoryStore::new()))
    } else {
        tracing::error!("Record store disabled; every call will report UNAVAILABLE");
        ItemService::without_store()
    };

    let listener = startup::bind(&config.listener.bind_address).await?;

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    spawn_signal_handler(shutdown.clone());

    RpcServer::new(Arc::new(service), config)
        .run(listener, server_shutdown)
        .await?;

    Ok(())
}
