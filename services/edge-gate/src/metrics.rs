//! Prometheus metrics exposition
//!
//! - `edge_requests_total` (counter): labels `status`, `method`
//! - `edge_request_duration_seconds` (histogram): label `status`
//! - `edge_upstream_errors_total` (counter): label `error_type`
//! - `admission_decisions_total` (counter): label `outcome`, recorded by the gate

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Histogram buckets for request duration, 5ms up to the 60s default timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Builder with `edge_request_duration_seconds` rendered as a histogram
/// (with `_bucket` lines) rather than the default summary.
pub fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("edge_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global recorder and return a handle for `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed forwarded request.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("edge_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("edge_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record an upstream failure: `timeout`, `connection`, `body` or `other`.
pub fn record_upstream_error(error_type: &'static str) {
    metrics::counter!("edge_upstream_errors_total", "error_type" => error_type).increment(1);
}
