//! Health aggregation for the gateway's `/health` endpoint.

use serde::Serialize;

use crate::config::BackendConfig;
use crate::gateway::ItemGateway;
use crate::resilience::CircuitState;
use crate::rpc::probe;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceIdentity {
    pub rpc: String,
    pub store: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// `connected` or `disconnected (<CODE>)`.
    pub rpc: String,
    /// The backend's own health check answer.
    pub backend: String,
    pub breaker: CircuitState,
    pub breaker_failures: u32,
    pub channel_generation: u64,
    pub services: ServiceIdentity,
}

/// Probe the current channel and collect breaker state.
///
/// Probes bypass the breaker and are bounded by the probe timeout, so the
/// report never waits on a hung backend.
pub async fn aggregate(gateway: &ItemGateway, backend: &BackendConfig) -> HealthReport {
    let slot = gateway.channel().current();
    let timeout = gateway.rpc_config().probe_timeout();

    let rpc = match probe(slot.channel.as_ref(), timeout).await {
        Ok(()) => "connected".to_string(),
        Err(status) => format!("disconnected ({})", status.code),
    };

    let backend_status = match slot.channel.health_check(timeout).await {
        Ok(status) => status.as_str().to_string(),
        Err(status) => format!("unknown ({})", status.code),
    };

    let breaker = gateway.breaker().snapshot();

    HealthReport {
        status: "healthy",
        rpc,
        backend: backend_status,
        breaker: breaker.state,
        breaker_failures: breaker.consecutive_failures,
        channel_generation: slot.generation,
        services: ServiceIdentity {
            rpc: backend.target(),
            store: backend.store_host.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerConfig, RpcConfig};
    use crate::resilience::{CircuitBreaker, RetryPolicy};
    use crate::rpc::{ChannelRef, LocalChannel};
    use crate::service::ItemService;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn gateway(store: Arc<MemoryStore>) -> ItemGateway {
        ItemGateway::new(
            Arc::new(ChannelRef::new(Arc::new(LocalChannel::new(Arc::new(
                ItemService::new(store),
            ))))),
            Arc::new(CircuitBreaker::new("items", &BreakerConfig::default())),
            RetryPolicy::default(),
            RpcConfig::default(),
        )
    }

    #[tokio::test]
    async fn healthy_backend() {
        let gw = gateway(Arc::new(MemoryStore::new()));
        let report = aggregate(&gw, &BackendConfig::default()).await;

        assert_eq!(report.status, "healthy");
        assert_eq!(report.rpc, "connected");
        assert_eq!(report.backend, "SERVING");
        assert_eq!(report.breaker, CircuitState::Closed);
        assert_eq!(report.breaker_failures, 0);
        assert_eq!(report.services.rpc, "localhost:50051");
        assert_eq!(report.services.store, BackendConfig::default().store_host);
    }

    #[tokio::test]
    async fn unreachable_store_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.set_reachable(false);
        let gw = gateway(store);
        let report = aggregate(&gw, &BackendConfig::default()).await;

        assert_eq!(report.status, "healthy");
        assert_eq!(report.rpc, "disconnected (UNAVAILABLE)");
        assert_eq!(report.backend, "NOT_SERVING");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["breaker"], "closed");
        assert_eq!(json["services"]["rpc"], "localhost:50051");
    }
}
