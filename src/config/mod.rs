//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), optional
//!     → loader.rs (parse & deserialize, defaults for missing fields)
//!     → loader.rs (environment overrides for deployment)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig / ServiceConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError, EnvOverrides};
pub use schema::{
    BackendConfig, BreakerConfig, GatewayConfig, ListenerConfig, MonitorConfig,
    ObservabilityConfig, RetryConfig, RpcConfig, ServiceConfig, StoreConfig,
};
pub use validation::{Validate, ValidationError};
