//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by method, status
//! - `router_request_duration_seconds` (histogram): end-to-end latency
//! - `router_resolutions_total` (counter): resolution outcomes by kind
//! - `router_resolve_duration_seconds` (histogram): time spent resolving
//! - `router_deployment_reloads_total` (counter): hot reloads applied

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("router_requests_total", &labels).increment(1);
    histogram!("router_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_resolution(outcome: &'static str, start: Instant) {
    counter!("router_resolutions_total", "outcome" => outcome).increment(1);
    histogram!("router_resolve_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_reload() {
    counter!("router_deployment_reloads_total").increment(1);
}
