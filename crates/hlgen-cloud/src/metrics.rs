//! Cloud request metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total cloud API requests by service, operation and status.
    pub const REQUESTS_TOTAL: &str = "hlgen_cloud_requests_total";

    /// Request latency in seconds by service and operation.
    pub const LATENCY_SECONDS: &str = "hlgen_cloud_latency_seconds";
}

/// Record metrics for a completed cloud request.
pub fn record_request(service: &'static str, operation: &'static str, status: u16, latency_secs: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "service" => service,
        "operation" => operation,
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "service" => service,
        "operation" => operation
    )
    .record(latency_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::REQUESTS_TOTAL.starts_with("hlgen_"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
    }
}
