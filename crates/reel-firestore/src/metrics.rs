//! Store request metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Store requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "reel_store_requests_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "reel_store_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "reel_store_latency_seconds";

    /// Conditional writes that affected zero rows.
    pub const CAS_CONFLICTS_TOTAL: &str = "reel_store_cas_conflicts_total";
}

/// Record metrics for a completed store request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Record a conditional write that lost its race.
pub fn record_cas_conflict(collection: &str) {
    counter!(names::CAS_CONFLICTS_TOTAL, "collection" => collection.to_string()).increment(1);
}
