//! Metrics for the read service
//!
//! Prometheus counters and histograms for dispatcher operations and bucket
//! data deletion, registered in the default registry.

use crate::error::Error;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Total dispatcher requests
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "readservice_requests_total",
        "Total read service requests by operation and status",
        &["operation", "status"]
    ).unwrap();

    /// Dispatcher request duration, up to the result being handed back
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "readservice_request_duration_seconds",
        "Read service request latency in seconds",
        &["operation"],
        vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Failed requests by error kind
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "readservice_errors_total",
        "Total read service errors by operation and kind",
        &["operation", "kind"]
    ).unwrap();

    /// Bucket data deletions
    pub static ref BUCKET_DELETES_TOTAL: CounterVec = register_counter_vec!(
        "readservice_bucket_deletes_total",
        "Total bucket deletion calls by status",
        &["status"]
    ).unwrap();
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a finished dispatcher request
#[inline]
pub fn record_request(operation: &str, duration_secs: f64, error: Option<&Error>) {
    let status = if error.is_some() { "error" } else { "success" };

    REQUESTS_TOTAL.with_label_values(&[operation, status]).inc();
    REQUEST_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);

    if let Some(e) = error {
        ERRORS_TOTAL
            .with_label_values(&[operation, e.kind().as_str()])
            .inc();
    }
}

/// Record a bucket deletion call
#[inline]
pub fn record_bucket_delete(error: Option<&Error>) {
    let status = match error {
        None => "success",
        Some(Error::NotFound(_)) => "not_found",
        Some(_) => "error",
    };
    BUCKET_DELETES_TOTAL.with_label_values(&[status]).inc();
}
