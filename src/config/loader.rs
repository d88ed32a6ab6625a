//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, ServiceConfig};
use crate::config::validation::{Validate, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: '{value}'")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Deployment overrides read from the environment after the file is parsed.
pub trait EnvOverrides {
    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>;
}

impl EnvOverrides for GatewayConfig {
    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ITEMS_BIND_ADDRESS") {
            self.listener.bind_address = addr;
        }
        if let Some(host) = lookup("ITEMS_RPC_HOST") {
            self.backend.host = host;
        }
        if let Some(port) = lookup("ITEMS_RPC_PORT") {
            self.backend.port = parse_port("ITEMS_RPC_PORT", port)?;
        }
        if let Some(host) = lookup("ITEMS_STORE_HOST") {
            self.backend.store_host = host;
        }
        Ok(())
    }
}

impl EnvOverrides for ServiceConfig {
    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ITEMS_BIND_ADDRESS") {
            self.listener.bind_address = addr;
        }
        if let Some(enabled) = lookup("ITEMS_STORE_ENABLED") {
            self.store.enabled = parse_bool("ITEMS_STORE_ENABLED", enabled)?;
        }
        Ok(())
    }
}

fn parse_port(name: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Env { name, value })
}

fn parse_bool(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Env { name, value }),
    }
}

/// Parse and validate a configuration from TOML text.
pub fn parse_config<T>(content: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    let config: T = toml::from_str(content)?;
    config.validate().map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load a configuration: the TOML file if given (defaults otherwise), then
/// environment overrides, then validation.
pub fn load_config<T>(path: Option<&Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default + Validate + EnvOverrides,
{
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => T::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate().map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_backend_location() {
        let env: HashMap<&str, &str> = [
            ("ITEMS_RPC_HOST", "grpc-server"),
            ("ITEMS_RPC_PORT", "6000"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.backend.target(), "grpc-server:6000");
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = GatewayConfig::default();
        let err = config
            .apply_env(|name| (name == "ITEMS_RPC_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "ITEMS_RPC_PORT", .. }));
    }

    #[test]
    fn store_can_be_disabled_from_the_environment() {
        let mut config = ServiceConfig::default();
        config
            .apply_env(|name| (name == "ITEMS_STORE_ENABLED").then(|| "false".to_string()))
            .unwrap();
        assert!(!config.store.enabled);

        let err = config
            .apply_env(|name| (name == "ITEMS_STORE_ENABLED").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "ITEMS_STORE_ENABLED", .. }));
    }

    #[test]
    fn parse_config_validates() {
        let err = parse_config::<GatewayConfig>("[retry]\nmax_retries = 0\n").unwrap_err();
        assert!(err.to_string().contains("retry.max_retries"));

        let config = parse_config::<GatewayConfig>("[monitor]\ninterval_secs = 2\n").unwrap();
        assert_eq!(config.monitor.interval_secs, 2);
    }
}
