//! Video API call metrics.

use std::time::Duration;

use metrics::{counter, histogram};

pub const REQUESTS_TOTAL: &str = "reel_video_api_requests_total";
pub const LATENCY_SECONDS: &str = "reel_video_api_latency_seconds";

pub fn record_call(operation: &'static str, ok: bool, elapsed: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(REQUESTS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
    histogram!(LATENCY_SECONDS, "operation" => operation).record(elapsed.as_secs_f64());
}
