//! Resilient item gateway library.
//!
//! A REST gateway in front of an item service, with a circuit breaker,
//! retry with backoff and a background connection monitor between them.

pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod resilience;
pub mod rpc;
pub mod service;
pub mod store;

pub use config::{GatewayConfig, ServiceConfig};
pub use error::{Error, Result};
pub use gateway::ItemGateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use rpc::RpcServer;
pub use service::ItemService;
