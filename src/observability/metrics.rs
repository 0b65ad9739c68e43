//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lifecycle_hooks_total` (counter): hook runs by phase, hook, outcome
//! - `lifecycle_hook_duration_seconds` (histogram): hook latency
//! - `resource_enabled` (gauge): 1=live, 0=disabled placeholder
//! - `resource_disabled_calls_total` (counter): calls rejected by a placeholder
//! - `http_active_connections` (gauge): connections currently served
//!
//! # Design Decisions
//! - Labels are low-cardinality: hook and resource names are fixed at startup
//! - The Prometheus exporter is optional; without it every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one lifecycle hook execution.
pub fn record_hook(phase: &'static str, hook: &str, outcome: &'static str, started: Instant) {
    let labels = vec![
        Label::new("phase", phase),
        Label::new("hook", hook.to_string()),
        Label::new("outcome", outcome),
    ];
    counter!("lifecycle_hooks_total", labels.clone()).increment(1);
    histogram!("lifecycle_hook_duration_seconds", labels).record(started.elapsed().as_secs_f64());
}

/// Record whether a resource was provisioned live or as a placeholder.
pub fn record_resource_enabled(resource: &'static str, enabled: bool) {
    gauge!("resource_enabled", "resource" => resource).set(if enabled { 1.0 } else { 0.0 });
}

/// Record a call rejected by a disabled placeholder.
pub fn record_disabled_call(resource: &'static str, operation: &'static str) {
    counter!(
        "resource_disabled_calls_total",
        "resource" => resource,
        "operation" => operation
    )
    .increment(1);
}

/// Record the number of connections currently served by the listener.
pub fn record_active_connections(count: u64) {
    gauge!("http_active_connections").set(count as f64);
}
