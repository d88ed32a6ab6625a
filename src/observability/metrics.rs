//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_http_requests_total` (counter): requests by route, status
//! - `gateway_http_request_duration_seconds` (histogram): latency by route
//! - `gateway_rpc_calls_total` (counter): guarded RPC calls by method, outcome
//! - `gateway_retries_total` (counter): retry attempts by operation
//! - `gateway_breaker_transitions_total` (counter): breaker transitions by from, to
//! - `gateway_breaker_state` (gauge): 0=closed, 1=open, 2=half_open
//! - `gateway_channel_reconnects_total` (counter): monitor reconnects by result
//! - `item_service_rpc_total` (counter): service calls by method, code
//! - `item_service_rpc_duration_seconds` (histogram): service latency by method
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so library code and
//!   tests record unconditionally
//! - Prometheus exposition on its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_http_request(route: &str, status: u16, start: Instant) {
    counter!(
        "gateway_http_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_http_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rpc_call(method: &'static str, outcome: &str) {
    counter!("gateway_rpc_calls_total", "method" => method, "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_retry(operation: &'static str) {
    counter!("gateway_retries_total", "operation" => operation).increment(1);
}

pub fn record_breaker_transition(from: &'static str, to: &'static str) {
    counter!("gateway_breaker_transitions_total", "from" => from, "to" => to).increment(1);
}

pub fn record_breaker_state(value: f64) {
    gauge!("gateway_breaker_state").set(value);
}

pub fn record_reconnect(result: &'static str) {
    counter!("gateway_channel_reconnects_total", "result" => result).increment(1);
}

pub fn record_service_call(method: &'static str, code: &str, start: Instant) {
    counter!("item_service_rpc_total", "method" => method, "code" => code.to_string())
        .increment(1);
    histogram!("item_service_rpc_duration_seconds", "method" => method)
        .record(start.elapsed().as_secs_f64());
}
