//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! Every problem is reported, not just the first one.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, ObservabilityConfig, ServiceConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Semantic validation run before a config is accepted.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

#[derive(Default)]
struct Errors(Vec<ValidationError>);

impl Errors {
    fn check(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.0.push(ValidationError::new(field, message));
        }
    }

    fn socket_addr(&mut self, field: &'static str, value: &str) {
        if value.parse::<SocketAddr>().is_err() {
            self.0.push(ValidationError::new(
                field,
                format!("'{}' is not a valid socket address", value),
            ));
        }
    }

    fn observability(&mut self, config: &ObservabilityConfig) {
        if config.metrics_enabled {
            self.socket_addr("observability.metrics_address", &config.metrics_address);
        }
        self.check(
            matches!(config.log_format.as_str(), "pretty" | "json"),
            "observability.log_format",
            "must be \"pretty\" or \"json\"",
        );
    }

    fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

impl Validate for GatewayConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Errors::default();

        errors.socket_addr("listener.bind_address", &self.listener.bind_address);
        errors.check(
            self.listener.max_concurrent_requests > 0,
            "listener.max_concurrent_requests",
            "must be greater than zero",
        );

        errors.check(!self.backend.host.is_empty(), "backend.host", "must not be empty");
        errors.check(self.backend.port != 0, "backend.port", "must not be zero");

        errors.check(
            self.rpc.connect_timeout_ms > 0,
            "rpc.connect_timeout_ms",
            "must be greater than zero",
        );
        errors.check(
            self.rpc.get_timeout_ms > 0,
            "rpc.get_timeout_ms",
            "must be greater than zero",
        );
        errors.check(
            self.rpc.list_timeout_ms > 0,
            "rpc.list_timeout_ms",
            "must be greater than zero",
        );
        errors.check(
            self.rpc.add_timeout_ms > 0,
            "rpc.add_timeout_ms",
            "must be greater than zero",
        );
        errors.check(
            self.rpc.probe_timeout_ms > 0,
            "rpc.probe_timeout_ms",
            "must be greater than zero",
        );
        errors.check(
            self.rpc.max_send_message_bytes > 0,
            "rpc.max_send_message_bytes",
            "must be greater than zero",
        );
        errors.check(
            self.rpc.max_receive_message_bytes > 0,
            "rpc.max_receive_message_bytes",
            "must be greater than zero",
        );

        errors.check(self.breaker.fail_max > 0, "breaker.fail_max", "must be greater than zero");
        errors.check(
            self.breaker.reset_timeout_secs > 0,
            "breaker.reset_timeout_secs",
            "must be greater than zero",
        );

        errors.check(self.retry.max_retries > 0, "retry.max_retries", "must be at least 1");
        errors.check(
            self.retry.max_delay_ms >= self.retry.initial_delay_ms,
            "retry.max_delay_ms",
            "must not be smaller than retry.initial_delay_ms",
        );

        errors.check(
            self.monitor.interval_secs > 0,
            "monitor.interval_secs",
            "must be greater than zero",
        );
        errors.check(
            self.timeouts.request_secs > 0,
            "timeouts.request_secs",
            "must be greater than zero",
        );

        errors.observability(&self.observability);
        errors.finish()
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Errors::default();

        errors.socket_addr("listener.bind_address", &self.listener.bind_address);
        errors.check(
            self.listener.max_workers > 0,
            "listener.max_workers",
            "must be greater than zero",
        );
        errors.check(
            self.max_receive_message_bytes > 0,
            "max_receive_message_bytes",
            "must be greater than zero",
        );

        errors.observability(&self.observability);
        errors.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.breaker.fail_max = 0;
        config.retry.max_retries = 0;
        config.retry.initial_delay_ms = 500;
        config.retry.max_delay_ms = 100;

        let errors = config.validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "breaker.fail_max",
                "retry.max_retries",
                "retry.max_delay_ms",
            ]
        );
    }

    #[test]
    fn service_limits_are_checked() {
        let mut config = ServiceConfig::default();
        config.listener.max_workers = 0;
        config.max_receive_message_bytes = 0;

        let errors = config.validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["listener.max_workers", "max_receive_message_bytes"]);
    }
}
