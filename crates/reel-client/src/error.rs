//! Client error types.

use thiserror::Error;

use reel_models::SceneId;
use reel_queue::QueueError;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure: the request may or may not have reached the server.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// The server answered with an error response.
    #[error("{detail} ({status})")]
    Api {
        status: u16,
        code: Option<String>,
        detail: String,
    },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Scene {0} is already generating")]
    SceneBusy(SceneId),

    #[error("Scene {0} is not loaded")]
    UnknownScene(SceneId),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ClientError {
    /// Transport-level failures, as opposed to application error responses.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Timeout)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(ClientError::Network("connection reset".into()).is_network());
        assert!(ClientError::Timeout.is_network());
        assert!(!ClientError::Api {
            status: 502,
            code: Some("upstream_error".into()),
            detail: "Video service error".into(),
        }
        .is_network());
        assert!(!ClientError::Queue(QueueError::TaskAborted).is_network());
    }
}
