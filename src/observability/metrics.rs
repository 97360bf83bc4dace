//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter)
//! - `proxy_connections_rejected_total` (counter): over the connection limit
//! - `proxy_connections_closed_total` (counter): by close reason
//! - `proxy_active_connections` (gauge): current connection count
//! - `proxy_requests_framed_total` (counter)
//! - `proxy_bytes_forwarded_total` (counter): by direction
//!
//! Updates go through the `metrics` facade and are no-ops until an exporter is
//! installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::observer::Direction;

/// Install the Prometheus exporter on `addr`.
///
/// The exporter serves scrapes from its own background thread.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_accepted() {
    metrics::counter!("proxy_connections_accepted_total").increment(1);
    metrics::gauge!("proxy_active_connections").increment(1.0);
}

pub fn record_rejected() {
    metrics::counter!("proxy_connections_rejected_total").increment(1);
}

pub fn record_closed(reason: &'static str) {
    metrics::counter!("proxy_connections_closed_total", "reason" => reason).increment(1);
    metrics::gauge!("proxy_active_connections").decrement(1.0);
}

pub fn record_request_framed() {
    metrics::counter!("proxy_requests_framed_total").increment(1);
}

pub fn record_forwarded(direction: Direction, bytes: usize) {
    metrics::counter!("proxy_bytes_forwarded_total", "direction" => direction.as_str())
        .increment(bytes as u64);
}
