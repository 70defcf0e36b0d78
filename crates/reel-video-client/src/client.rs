//! HTTP client for a queue-style image-to-video API.
//!
//! Submit returns a request id immediately; the job is then observed through
//! the status and result endpoints. Every call is bounded by its own timeout.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, info, warn};

use crate::error::{VideoApiError, VideoApiResult};
use crate::metrics::record_call;
use crate::types::{
    ResultResponse, StatusResponse, SubmitBody, SubmitResponse, UpstreamStatus, VideoOutput,
    VideoRequest,
};

/// Operations the job handlers need from the video service.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Submit a job, returning the upstream request id.
    async fn submit(&self, request: &VideoRequest) -> VideoApiResult<String>;

    async fn status(&self, job_id: &str) -> VideoApiResult<UpstreamStatus>;

    async fn result(&self, job_id: &str) -> VideoApiResult<VideoOutput>;

    async fn cancel(&self, job_id: &str) -> VideoApiResult<()>;
}

/// Video client configuration.
#[derive(Debug, Clone)]
pub struct VideoClientConfig {
    pub base_url: String,
    pub api_key: String,
    /// Model path, e.g. `fal-ai/kling-video/v1.6/standard/image-to-video`
    pub model: String,
    pub duration_secs: u32,
    pub aspect_ratio: String,
    pub negative_prompt: Option<String>,
    pub submit_timeout: Duration,
    pub status_timeout: Duration,
    pub cancel_timeout: Duration,
}

impl Default for VideoClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://queue.fal.run".to_string(),
            api_key: String::new(),
            model: "fal-ai/kling-video/v1.6/standard/image-to-video".to_string(),
            duration_secs: 5,
            aspect_ratio: "16:9".to_string(),
            negative_prompt: Some("blur, distort, and low quality".to_string()),
            submit_timeout: Duration::from_secs(15),
            status_timeout: Duration::from_secs(10),
            cancel_timeout: Duration::from_secs(10),
        }
    }
}

impl VideoClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> VideoApiResult<Self> {
        let defaults = Self::default();

        let api_key = std::env::var("VIDEO_API_KEY")
            .or_else(|_| std::env::var("FAL_KEY"))
            .map_err(|_| VideoApiError::NotConfigured("VIDEO_API_KEY must be set".into()))?;

        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Ok(Self {
            base_url: std::env::var("VIDEO_API_BASE_URL").unwrap_or(defaults.base_url),
            api_key,
            model: std::env::var("VIDEO_MODEL").unwrap_or(defaults.model),
            duration_secs: std::env::var("VIDEO_DURATION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.duration_secs),
            aspect_ratio: std::env::var("VIDEO_ASPECT_RATIO").unwrap_or(defaults.aspect_ratio),
            negative_prompt: match std::env::var("VIDEO_NEGATIVE_PROMPT") {
                Ok(v) if v.trim().is_empty() => None,
                Ok(v) => Some(v),
                Err(_) => defaults.negative_prompt,
            },
            submit_timeout: secs("VIDEO_SUBMIT_TIMEOUT_SECS", defaults.submit_timeout),
            status_timeout: secs("VIDEO_STATUS_TIMEOUT_SECS", defaults.status_timeout),
            cancel_timeout: secs("VIDEO_CANCEL_TIMEOUT_SECS", defaults.cancel_timeout),
        })
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Request endpoints live under the `owner/app` prefix of the model path.
    fn app_path(&self) -> String {
        self.model
            .trim_matches('/')
            .splitn(3, '/')
            .take(2)
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// [`VideoApi`] over HTTP.
#[derive(Clone)]
pub struct QueueVideoClient {
    http: Client,
    config: VideoClientConfig,
}

impl QueueVideoClient {
    pub fn new(config: VideoClientConfig) -> VideoApiResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("reel-video-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> VideoApiResult<Self> {
        Self::new(VideoClientConfig::from_env()?)
    }

    pub fn config(&self) -> &VideoClientConfig {
        &self.config
    }

    fn request_url(&self, job_id: &str, suffix: &str) -> String {
        format!(
            "{}/{}/requests/{}{}",
            self.config.base(),
            self.config.app_path(),
            job_id,
            suffix
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("Key {}", self.config.api_key))
    }

    /// Run one call under a deadline and record its outcome.
    async fn timed<T, Fut>(
        &self,
        operation: &'static str,
        limit: Duration,
        fut: Fut,
    ) -> VideoApiResult<T>
    where
        Fut: Future<Output = VideoApiResult<T>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(limit, fut).await {
            Ok(r) => r,
            Err(_) => Err(VideoApiError::Timeout {
                operation,
                after: limit,
            }),
        };
        record_call(operation, result.is_ok(), start.elapsed());
        result
    }

    async fn check(operation: &'static str, response: Response) -> VideoApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(VideoApiError::Rejected {
            operation,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl VideoApi for QueueVideoClient {
    async fn submit(&self, request: &VideoRequest) -> VideoApiResult<String> {
        let url = format!("{}/{}", self.config.base(), self.config.model.trim_matches('/'));
        let body = SubmitBody {
            prompt: &request.prompt,
            image_url: &request.image_url,
            duration: self.config.duration_secs.to_string(),
            aspect_ratio: &self.config.aspect_ratio,
            negative_prompt: self.config.negative_prompt.as_deref(),
        };

        let job_id = self
            .timed("submit", self.config.submit_timeout, async {
                let response = self.authorized(self.http.post(&url)).json(&body).send().await?;
                let response = Self::check("submit", response).await?;
                let parsed: SubmitResponse = response.json().await.map_err(|e| {
                    VideoApiError::invalid_response(format!("submit response: {}", e))
                })?;
                Ok::<_, VideoApiError>(parsed.request_id)
            })
            .await?;

        info!(job_id = %job_id, model = %self.config.model, "Submitted video job");
        Ok(job_id)
    }

    async fn status(&self, job_id: &str) -> VideoApiResult<UpstreamStatus> {
        let url = self.request_url(job_id, "/status");

        let status = self
            .timed("status", self.config.status_timeout, async {
                let response = self.authorized(self.http.get(&url)).send().await?;
                let response = Self::check("status", response).await?;
                let parsed: StatusResponse = response.json().await.map_err(|e| {
                    VideoApiError::invalid_response(format!("status response: {}", e))
                })?;
                parsed.into_status()
            })
            .await?;

        debug!(job_id = %job_id, status = ?status, "Video job status");
        Ok(status)
    }

    async fn result(&self, job_id: &str) -> VideoApiResult<VideoOutput> {
        let url = self.request_url(job_id, "");

        self.timed("result", self.config.status_timeout, async {
            let response = self.authorized(self.http.get(&url)).send().await?;
            let response = Self::check("result", response).await?;
            let parsed: ResultResponse = response.json().await.map_err(|e| {
                VideoApiError::invalid_response(format!("result response: {}", e))
            })?;
            Ok::<_, VideoApiError>(VideoOutput::from(parsed))
        })
        .await
    }

    async fn cancel(&self, job_id: &str) -> VideoApiResult<()> {
        let url = self.request_url(job_id, "/cancel");

        let result = self
            .timed("cancel", self.config.cancel_timeout, async {
                let response = self.authorized(self.http.put(&url)).send().await?;
                Self::check("cancel", response).await?;
                Ok::<_, VideoApiError>(())
            })
            .await;

        if let Err(e) = &result {
            warn!(job_id = %job_id, "Video job cancel failed: {}", e);
        }
        result
    }
}
