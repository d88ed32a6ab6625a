//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use item_gateway::config::{GatewayConfig, ServiceConfig};
use item_gateway::store::MemoryStore;
use item_gateway::{HttpServer, ItemService, RpcServer, Shutdown};

/// A server running in the background until dropped.
pub struct Running {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the item service on `listener` over `store`.
pub async fn start_item_service_on(listener: TcpListener, store: Arc<MemoryStore>) -> Running {
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = RpcServer::new(Arc::new(ItemService::new(store)), ServiceConfig::default());
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    Running { addr, shutdown }
}

pub async fn start_item_service(store: Arc<MemoryStore>) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    start_item_service_on(listener, store).await
}

/// A loopback address with nothing listening on it.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Gateway configuration pointing at `backend`, tuned for fast tests.
pub fn gateway_config(backend: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backend.host = backend.ip().to_string();
    config.backend.port = backend.port();
    config.retry.initial_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config.monitor.enabled = false;
    config.observability.metrics_enabled = false;
    config
}

pub async fn start_gateway(config: GatewayConfig) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    Running { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `check` until it returns true or `limit` passes.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
