//! Metrics collection and exposition.
//!
//! # Metrics
//! - `notrace_requests_total` (counter): requests by method and status
//! - `notrace_request_duration_seconds` (histogram): latency by method
//! - `notrace_transforms_total` (counter): transforms by operation and outcome
//! - `notrace_transform_duration_seconds` (histogram): transform latency by operation
//! - `notrace_scratch_swept_total` (counter): handles released by shutdown sweeps
//!
//! # Design Decisions
//! - Labels are closed sets chosen by the service (never paths or client data)
//! - The Prometheus exporter is only installed when an address is configured

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Error type for exporter installation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("invalid metrics address {0}")]
    Address(String),
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Start the Prometheus scrape endpoint on `address`.
pub fn install_exporter(address: &str) -> Result<SocketAddr, MetricsError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|_| MetricsError::Address(address.to_string()))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| MetricsError::Install(err.to_string()))?;
    Ok(addr)
}

/// Record one finished HTTP request.
pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "notrace_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("notrace_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record one finished transform.
pub fn record_transform(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!("notrace_transforms_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("notrace_transform_duration_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record handles released by a sweep.
pub fn record_swept(count: usize) {
    if count > 0 {
        metrics::counter!("notrace_scratch_swept_total").increment(count as u64);
    }
}
