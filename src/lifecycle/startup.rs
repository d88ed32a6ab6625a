//! Startup orchestration shared by the binaries.
//!
//! # Responsibilities
//! - Initialize logging, then metrics
//! - Bind listeners last
//!
//! # Design Decisions
//! - Fail fast: logging and bind errors are fatal
//! - A metrics endpoint that cannot start is logged, not fatal

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ObservabilityConfig;
use crate::observability::{logging, metrics};

/// Install logging and, if enabled, the Prometheus exporter.
pub fn init_observability(
    config: &ObservabilityConfig,
    extra_directives: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init_logging(config, extra_directives)?;

    if config.metrics_enabled {
        match config.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(
                        error = %e,
                        address = %addr,
                        "Failed to start metrics endpoint"
                    );
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    Ok(())
}

/// Bind the public listener.
pub async fn bind(address: &str) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    Ok(listener)
}
