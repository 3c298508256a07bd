//! Metrics hook.
//!
//! # Metrics
//! - `query_proxy_requests_total` (counter): requests by disposition and status
//! - `query_proxy_forward_duration_seconds` (histogram): time spent in the forward call
//! - `query_proxy_streamed_bytes_total` (counter): bytes copied from the remote to callers
//! - `query_proxy_partial_failures_total` (counter): streams cut after bytes were sent
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a recorder is installed
//! - The Prometheus exporter is optional and installed by the binary only

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

pub const REQUESTS_TOTAL: &str = "query_proxy_requests_total";
pub const FORWARD_DURATION: &str = "query_proxy_forward_duration_seconds";
pub const STREAMED_BYTES: &str = "query_proxy_streamed_bytes_total";
pub const PARTIAL_FAILURES: &str = "query_proxy_partial_failures_total";

/// Register descriptions for every metric the proxy records.
pub fn describe() {
    describe_counter!(REQUESTS_TOTAL, Unit::Count, "Proxied query requests by disposition");
    describe_histogram!(FORWARD_DURATION, Unit::Seconds, "Duration of the forward call");
    describe_counter!(STREAMED_BYTES, Unit::Bytes, "Bytes streamed from the remote backend");
    describe_counter!(PARTIAL_FAILURES, Unit::Count, "Streams terminated after bytes were sent");
}

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(disposition: &'static str, status: u16) {
    counter!(REQUESTS_TOTAL, "disposition" => disposition, "status" => status.to_string())
        .increment(1);
}

pub fn record_forward(elapsed: Duration, bytes_written: u64) {
    histogram!(FORWARD_DURATION).record(elapsed.as_secs_f64());
    counter!(STREAMED_BYTES).increment(bytes_written);
}

pub fn record_partial_failure() {
    counter!(PARTIAL_FAILURES).increment(1);
}
