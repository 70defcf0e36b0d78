//! Request/response types for the queue API.

use serde::{Deserialize, Serialize};

use crate::error::{VideoApiError, VideoApiResult};

/// What the caller supplies per job. Duration, aspect ratio and negative
/// prompt come from the client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub prompt: String,
    pub image_url: String,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_url: image_url.into(),
        }
    }
}

/// Upstream job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamStatus {
    InQueue,
    InProgress,
    Completed,
    Failed { error: Option<String> },
}

/// Output of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoOutput {
    pub video_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitBody<'a> {
    pub prompt: &'a str,
    pub image_url: &'a str,
    pub duration: String,
    pub aspect_ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn into_status(self) -> VideoApiResult<UpstreamStatus> {
        match self.status.as_str() {
            "IN_QUEUE" => Ok(UpstreamStatus::InQueue),
            "IN_PROGRESS" => Ok(UpstreamStatus::InProgress),
            "COMPLETED" => Ok(UpstreamStatus::Completed),
            "FAILED" | "ERROR" => Ok(UpstreamStatus::Failed { error: self.error }),
            other => Err(VideoApiError::invalid_response(format!(
                "unknown job status {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultResponse {
    #[serde(default)]
    pub video: Option<VideoFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoFile {
    #[serde(default)]
    pub url: Option<String>,
}

impl From<ResultResponse> for VideoOutput {
    fn from(r: ResultResponse) -> Self {
        Self {
            video_url: r.video.and_then(|v| v.url).filter(|u| !u.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        let parse = |json: &str| {
            serde_json::from_str::<StatusResponse>(json)
                .unwrap()
                .into_status()
        };
        assert_eq!(parse(r#"{"status":"IN_QUEUE"}"#).unwrap(), UpstreamStatus::InQueue);
        assert_eq!(parse(r#"{"status":"COMPLETED"}"#).unwrap(), UpstreamStatus::Completed);
        assert_eq!(
            parse(r#"{"status":"FAILED","error":"nsfw"}"#).unwrap(),
            UpstreamStatus::Failed {
                error: Some("nsfw".into())
            }
        );
        assert!(parse(r#"{"status":"SLEEPING"}"#).is_err());
    }

    #[test]
    fn test_result_without_url() {
        let r: ResultResponse = serde_json::from_str(r#"{"video":{"url":""}}"#).unwrap();
        assert_eq!(VideoOutput::from(r).video_url, None);

        let r: ResultResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(VideoOutput::from(r).video_url, None);
    }
}
