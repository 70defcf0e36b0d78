//! API configuration.

use std::str::FromStr;
use std::time::Duration;

/// Which scene store the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Firestore,
    /// In-process store, lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown scene store backend: {}", other)),
        }
    }
}

/// Job lifecycle tuning.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// A generating record older than this is force-reset
    pub stale_threshold: Duration,
    /// Records reconciled in parallel per poll cycle
    pub poll_concurrency: usize,
    /// Run poll cycles on a timer inside the server
    pub background_poll: bool,
    pub background_poll_interval: Duration,
    /// Cost logged per completed clip (USD)
    pub cost_per_clip: f64,
    /// Billing service name written to the cost ledger
    pub cost_service: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::from_secs(300),
            poll_concurrency: 8,
            background_poll: true,
            background_poll_interval: Duration::from_secs(10),
            cost_per_clip: 0.28,
            cost_service: "fal".to_string(),
        }
    }
}

impl JobConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stale_threshold: env_secs("VIDEO_STALE_THRESHOLD_SECS", defaults.stale_threshold),
            poll_concurrency: env_parse("POLL_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.poll_concurrency),
            background_poll: env_flag("ENABLE_BACKGROUND_POLL", defaults.background_poll),
            background_poll_interval: env_secs(
                "BACKGROUND_POLL_INTERVAL_SECS",
                defaults.background_poll_interval,
            ),
            cost_per_clip: env_parse("VIDEO_COST_PER_CLIP").unwrap_or(defaults.cost_per_clip),
            cost_service: std::env::var("VIDEO_COST_SERVICE").unwrap_or(defaults.cost_service),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    pub scene_store: StoreBackend,
    /// Redis URL for the change feed; in-process feed when unset
    pub redis_url: Option<String>,
    pub jobs: JobConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
            environment: "development".to_string(),
            scene_store: StoreBackend::Firestore,
            redis_url: None,
            jobs: JobConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            request_timeout: env_secs("REQUEST_TIMEOUT", defaults.request_timeout),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            scene_store: env_parse("SCENE_STORE").unwrap_or(defaults.scene_store),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            jobs: JobConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse(key).map(Duration::from_secs).unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}
