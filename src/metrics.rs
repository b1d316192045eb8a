//! Lightweight metrics helpers for the gateway.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is embedded;
//! the application (or embedding environment) installs whatever recorder it
//! wants and these names light up.
//!
//! Provided metrics:
//! * `gateway_requests_total` (counter, label: status)
//! * `gateway_request_duration_seconds` (histogram)
//! * `gateway_upstream_requests_total` (counter, labels: upstream, status)
//! * `gateway_upstream_request_duration_seconds` (histogram, label: upstream)
//! * `gateway_rate_limited_total` (counter)
//! * `gateway_active_rate_buckets` (gauge)
use std::time::Duration;

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};

pub const GATEWAY_REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const GATEWAY_REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
pub const GATEWAY_UPSTREAM_REQUESTS_TOTAL: &str = "gateway_upstream_requests_total";
pub const GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS: &str =
    "gateway_upstream_request_duration_seconds";
pub const GATEWAY_RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
pub const GATEWAY_ACTIVE_RATE_BUCKETS: &str = "gateway_active_rate_buckets";

/// Register metric descriptions. Call once at startup.
pub fn describe_metrics() {
    describe_counter!(
        GATEWAY_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        GATEWAY_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        GATEWAY_UPSTREAM_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests forwarded to upstream services."
    );
    describe_histogram!(
        GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of upstream round trips."
    );
    describe_counter!(
        GATEWAY_RATE_LIMITED_TOTAL,
        Unit::Count,
        "Requests rejected by the per-IP rate limiter."
    );
    describe_gauge!(
        GATEWAY_ACTIVE_RATE_BUCKETS,
        Unit::Count,
        "Client IPs currently tracked by the rate limiter."
    );
}

/// Record one completed gateway request.
pub fn record_request(status: u16, duration: Duration) {
    counter!(GATEWAY_REQUESTS_TOTAL, "status" => status.to_string()).increment(1);
    histogram!(GATEWAY_REQUEST_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Record one upstream round trip.
pub fn record_upstream(upstream: &str, status: u16, duration: Duration) {
    counter!(
        GATEWAY_UPSTREAM_REQUESTS_TOTAL,
        "upstream" => upstream.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS, "upstream" => upstream.to_string())
        .record(duration.as_secs_f64());
}

/// Count one rate-limited rejection.
pub fn record_rate_limited() {
    counter!(GATEWAY_RATE_LIMITED_TOTAL).increment(1);
}

/// Publish the rate-limiter map size after a sweep.
pub fn set_active_rate_buckets(count: usize) {
    gauge!(GATEWAY_ACTIVE_RATE_BUCKETS).set(count as f64);
}
