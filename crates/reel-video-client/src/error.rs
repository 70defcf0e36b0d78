//! Video API error types.

use std::time::Duration;

use thiserror::Error;

pub type VideoApiResult<T> = Result<T, VideoApiError>;

#[derive(Debug, Error)]
pub enum VideoApiError {
    #[error("Video API {operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Video API rejected {operation} ({status}): {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid video API response: {0}")]
    InvalidResponse(String),

    #[error("Video API not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl VideoApiError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Timeouts and transport failures: the request may or may not have reached upstream.
    pub fn is_network(&self) -> bool {
        matches!(self, VideoApiError::Timeout { .. } | VideoApiError::Network(_))
    }

    /// Failures worth retrying on a later cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            VideoApiError::Timeout { .. } | VideoApiError::Network(_) => true,
            VideoApiError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, VideoApiError::Timeout { .. })
    }

    /// Short message suitable for the scene's `error_text`.
    pub fn user_message(&self) -> String {
        match self {
            VideoApiError::Timeout { .. } => "Video service did not respond in time".to_string(),
            VideoApiError::Rejected { status, body, .. } => {
                let detail = body.trim();
                if detail.is_empty() {
                    format!("Video service error ({})", status)
                } else {
                    let detail: String = detail.chars().take(300).collect();
                    format!("Video service error ({}): {}", status, detail)
                }
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let timeout = VideoApiError::Timeout {
            operation: "submit",
            after: Duration::from_secs(15),
        };
        assert!(timeout.is_network());
        assert!(timeout.is_transient());
        assert_eq!(timeout.to_string(), "Video API submit timed out after 15s");

        let server = VideoApiError::Rejected {
            operation: "status",
            status: 503,
            body: String::new(),
        };
        assert!(!server.is_network());
        assert!(server.is_transient());

        let bad_request = VideoApiError::Rejected {
            operation: "submit",
            status: 422,
            body: "image_url is invalid".into(),
        };
        assert!(!bad_request.is_transient());
        assert_eq!(
            bad_request.user_message(),
            "Video service error (422): image_url is invalid"
        );
    }
}
