//! Client configuration.

use std::time::Duration;

use reel_queue::DEFAULT_TASK_DELAY;

/// Reconciliation timings and the server location.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API server (`/functions/*` and `/api/*` live under it)
    pub functions_url: String,
    /// Pause between queued submissions
    pub queue_delay: Duration,
    /// Realtime refetches are ignored this long after a local mutation
    pub cooldown: Duration,
    /// Poll + refetch interval while any scene is generating
    pub fallback_interval: Duration,
    /// Wait before re-reading a scene after a network-class submit error
    pub network_recheck_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            functions_url: "http://localhost:8000".to_string(),
            queue_delay: DEFAULT_TASK_DELAY,
            cooldown: Duration::from_secs(5),
            fallback_interval: Duration::from_secs(8),
            network_recheck_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new(functions_url: impl Into<String>) -> Self {
        Self {
            functions_url: functions_url.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            functions_url: std::env::var("REEL_FUNCTIONS_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.functions_url),
            queue_delay: millis("REEL_QUEUE_DELAY_MS", defaults.queue_delay),
            cooldown: millis("REEL_REALTIME_COOLDOWN_MS", defaults.cooldown),
            fallback_interval: millis("REEL_FALLBACK_POLL_MS", defaults.fallback_interval),
            network_recheck_delay: millis("REEL_NETWORK_RECHECK_MS", defaults.network_recheck_delay),
            request_timeout: millis("REEL_REQUEST_TIMEOUT_MS", defaults.request_timeout),
        }
    }
}
