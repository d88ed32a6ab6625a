//! Configuration schema definitions.
//!
//! This module defines the configuration structures for the gateway and the
//! item service. All types derive Serde traits for deserialization from
//! config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rpc::Code;

/// Root configuration for the REST gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, concurrency bound).
    pub listener: ListenerConfig,

    /// Where the item service lives.
    pub backend: BackendConfig,

    /// RPC channel settings (timeouts, keepalive, message sizes).
    pub rpc: RpcConfig,

    /// Circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Retry configuration.
    pub retry: RetryConfig,

    /// Connection monitor settings.
    pub monitor: MonitorConfig,

    /// Timeout configuration for the external surface.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Root configuration for the item service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, worker bound).
    pub listener: ServiceListenerConfig,

    /// Largest request body accepted, in bytes.
    pub max_receive_message_bytes: usize,

    /// Record store connection settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listener: ServiceListenerConfig::default(),
            max_receive_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            store: StoreConfig::default(),
            observability: ObservabilityConfig {
                metrics_address: "0.0.0.0:9103".to_string(),
                ..ObservabilityConfig::default()
            },
        }
    }
}

const DEFAULT_MAX_MESSAGE_BYTES: usize = 100 * 1024 * 1024;

/// Gateway listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Maximum requests handled concurrently (backpressure).
    pub max_concurrent_requests: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            max_concurrent_requests: 64,
        }
    }
}

/// Item service listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceListenerConfig {
    /// Bind address (e.g., "0.0.0.0:50051").
    pub bind_address: String,

    /// Maximum RPCs served concurrently.
    pub max_workers: usize,
}

impl Default for ServiceListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:50051".to_string(),
            max_workers: 10,
        }
    }
}

/// Location and identity of the backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Item service host.
    pub host: String,

    /// Item service port.
    pub port: u16,

    /// Store host, reported for identification only.
    pub store_host: String,
}

impl BackendConfig {
    /// `host:port` of the item service.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 50051,
            store_host: "mymongo".to_string(),
        }
    }
}

/// RPC channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// TCP keepalive interval in milliseconds.
    pub keepalive_ms: u64,

    /// Deadline for `GetItemById` in milliseconds.
    pub get_timeout_ms: u64,

    /// Deadline for a full `ListAllItems` stream in milliseconds.
    pub list_timeout_ms: u64,

    /// Deadline for `AddItem` in milliseconds.
    pub add_timeout_ms: u64,

    /// Deadline for health probes in milliseconds.
    pub probe_timeout_ms: u64,

    /// Largest request message sent, in bytes.
    pub max_send_message_bytes: usize,

    /// Largest response message accepted, in bytes.
    pub max_receive_message_bytes: usize,
}

impl RpcConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    pub fn add_timeout(&self) -> Duration {
        Duration::from_millis(self.add_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            keepalive_ms: 10_000,
            get_timeout_ms: 1000,
            list_timeout_ms: 1000,
            add_timeout_ms: 3000,
            probe_timeout_ms: 1000,
            max_send_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_receive_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub fail_max: u32,

    /// Seconds the breaker stays open before allowing a trial call.
    pub reset_timeout_secs: u64,

    /// Status codes that never count as failures.
    pub exclude: Vec<Code>,
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            fail_max: 3,
            reset_timeout_secs: 30,
            exclude: vec![Code::NotFound, Code::InvalidArgument, Code::AlreadyExists],
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds; doubles each retry.
    pub initial_delay_ms: u64,

    /// Upper bound on a single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter on top of each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
            jitter: false,
        }
    }
}

/// Connection monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Run the background connection monitor.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
        }
    }
}

/// Timeout configuration for the external surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Record store settings. The store runs in-process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Without a store every call is UNAVAILABLE and the health check
    /// reports NOT_SERVING.
    pub enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9102".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_gateway_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [backend]
            host = "items"

            [breaker]
            fail_max = 5
            exclude = ["NOT_FOUND"]
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.target(), "items:50051");
        assert_eq!(config.breaker.fail_max, 5);
        assert_eq!(config.breaker.exclude, vec![Code::NotFound]);
        assert_eq!(config.breaker.reset_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.rpc.add_timeout(), Duration::from_secs(3));
        assert_eq!(config.monitor.interval(), Duration::from_secs(10));
    }

    #[test]
    fn service_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:50051");
        assert_eq!(config.listener.max_workers, 10);
        assert!(config.store.enabled);
    }
}
