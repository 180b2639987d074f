//! Metrics collection and exposition.
//!
//! # Metrics
//! - `apm_demo_requests_total` (counter): requests by route, status
//! - `apm_demo_injected_delay_seconds` (histogram): simulated latency
//! - `apm_demo_transactions_total` (counter): APM transactions by name, outcome
//! - `apm_demo_errors_captured_total` (counter): errors handed to the APM client
//! - `apm_demo_log_entries_dropped_total` (counter): entries the remote sink lost

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "apm_demo_requests_total";
pub const INJECTED_DELAY: &str = "apm_demo_injected_delay_seconds";
pub const TRANSACTIONS_TOTAL: &str = "apm_demo_transactions_total";
pub const ERRORS_CAPTURED: &str = "apm_demo_errors_captured_total";
pub const LOG_ENTRIES_DROPPED: &str = "apm_demo_log_entries_dropped_total";

/// Install the Prometheus exporter and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe() {
    describe_counter!(REQUESTS_TOTAL, "Requests served, by route and status");
    describe_histogram!(INJECTED_DELAY, Unit::Seconds, "Latency injected before routing");
    describe_counter!(TRANSACTIONS_TOTAL, "APM transactions, by name and outcome");
    describe_counter!(ERRORS_CAPTURED, "Errors reported to the APM client");
    describe_counter!(LOG_ENTRIES_DROPPED, "Log entries the remote sink could not accept");
}

pub fn record_request(route: &str, status: u16) {
    counter!(REQUESTS_TOTAL, "route" => route.to_string(), "status" => status.to_string())
        .increment(1);
}

pub fn record_delay(delay: Duration) {
    histogram!(INJECTED_DELAY).record(delay.as_secs_f64());
}

pub fn record_transaction(name: &str, outcome: &'static str) {
    counter!(TRANSACTIONS_TOTAL, "name" => name.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_error_captured() {
    counter!(ERRORS_CAPTURED).increment(1);
}

pub fn record_log_drop() {
    counter!(LOG_ENTRIES_DROPPED).increment(1);
}
