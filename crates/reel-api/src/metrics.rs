//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "reel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "reel_http_requests_in_flight";

    // Job lifecycle metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "reel_video_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "reel_video_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reel_video_jobs_failed_total";
    pub const JOBS_TIMED_OUT_TOTAL: &str = "reel_video_jobs_timed_out_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "reel_video_jobs_cancelled_total";
    pub const SUBMIT_CONFLICTS_TOTAL: &str = "reel_video_submit_conflicts_total";
    pub const POLL_CYCLE_RECORDS: &str = "reel_poll_cycle_records";
    pub const POLL_CYCLE_UPDATES_TOTAL: &str = "reel_poll_cycle_updates_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "reel_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

/// `stage` is "submit" or "upstream".
pub fn record_job_failed(stage: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "stage" => stage).increment(1);
}

pub fn record_job_timed_out() {
    counter!(names::JOBS_TIMED_OUT_TOTAL).increment(1);
}

pub fn record_job_cancelled(upstream_cancelled: bool) {
    counter!(
        names::JOBS_CANCELLED_TOTAL,
        "upstream" => if upstream_cancelled { "cancelled" } else { "skipped" }
    )
    .increment(1);
}

pub fn record_submit_conflict() {
    counter!(names::SUBMIT_CONFLICTS_TOTAL).increment(1);
}

/// Record one poll cycle.
pub fn record_poll_cycle(checked: usize, updates: usize) {
    histogram!(names::POLL_CYCLE_RECORDS).record(checked as f64);
    counter!(names::POLL_CYCLE_UPDATES_TOTAL).increment(updates as u64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Metrics middleware for HTTP requests. Labels use the route template,
/// so ids in the path do not explode label cardinality.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
