//! Metrics collection and exposition.
//!
//! # Metrics
//! - `account_requests_total` (counter): requests by method, status
//! - `account_request_duration_seconds` (histogram): latency distribution
//! - `account_rate_limited_total` (counter): limiter denials
//! - `account_deadline_timeouts_total` (counter): requests past their deadline
//! - `account_content_violations_total` (counter): scanner matches
//! - `account_password_conflicts_total` (counter): optimistic-lock losses

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    counter!("account_requests_total", "method" => method.clone(), "status" => status.clone()).increment(1);
    histogram!("account_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("account_rate_limited_total").increment(1);
}

pub fn record_timeout() {
    counter!("account_deadline_timeouts_total").increment(1);
}

pub fn record_content_violation() {
    counter!("account_content_violations_total").increment(1);
}

pub fn record_password_conflict() {
    counter!("account_password_conflicts_total").increment(1);
}
