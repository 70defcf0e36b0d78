//! HTTP implementation of [`SceneBackend`].

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use reel_models::{ProjectId, SceneId, SceneJob};

use crate::backend::{CancelResponse, GenerateRequest, GenerateResponse, PollResponse, SceneBackend};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
    #[serde(default)]
    code: Option<String>,
}

/// Client for the API server's `/functions` and `/api` routes.
#[derive(Clone)]
pub struct FunctionsClient {
    http: Client,
    base_url: String,
}

impl FunctionsClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.functions_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<R> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self.http.post(&url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> ClientResult<R> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self.http.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: Response) -> ClientResult<R> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let (detail, code) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.detail, body.code),
            Err(_) => (text, None),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            detail,
        })
    }
}

#[async_trait]
impl SceneBackend for FunctionsClient {
    async fn generate(&self, request: &GenerateRequest) -> ClientResult<GenerateResponse> {
        self.post("/functions/generate-scene-video", request).await
    }

    async fn poll(&self, project_id: Option<&ProjectId>) -> ClientResult<PollResponse> {
        self.post("/functions/poll-video-status", &json!({ "project_id": project_id }))
            .await
    }

    async fn cancel(&self, scene_id: &SceneId) -> ClientResult<CancelResponse> {
        self.post(
            "/functions/cancel-video-generation",
            &json!({ "scene_id": scene_id }),
        )
        .await
    }

    async fn get_scene(&self, scene_id: &SceneId) -> ClientResult<Option<SceneJob>> {
        match self.get(&format!("/api/scenes/{}", scene_id)).await {
            Ok(scene) => Ok(Some(scene)),
            Err(ClientError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_scenes(&self, project_id: &ProjectId) -> ClientResult<Vec<SceneJob>> {
        self.get(&format!("/api/projects/{}/scenes", project_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::VideoStatus;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> FunctionsClient {
        FunctionsClient::new(&ClientConfig::new(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_generate_posts_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/generate-scene-video"))
            .and(body_json(json!({ "scene_id": "s1", "shot_type": "wide" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "scene_id": "s1",
                "job_id": "abc",
                "status": "generating"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerateRequest {
            scene_id: SceneId::from("s1"),
            shot_type: Some("wide".to_string()),
            ..Default::default()
        };
        let response = client(&server).await.generate(&request).await.unwrap();
        assert_eq!(response.job_id, "abc");
        assert_eq!(response.status, VideoStatus::Generating);
    }

    #[tokio::test]
    async fn test_error_response_is_application_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/generate-scene-video"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "detail": "Conflict: Scene s1 is already generating",
                "code": "conflict"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .generate(&GenerateRequest {
                scene_id: SceneId::from("s1"),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(!err.is_network());
        assert_eq!(err.status(), Some(409));
        assert!(matches!(err, ClientError::Api { code: Some(ref c), .. } if c == "conflict"));
    }

    #[tokio::test]
    async fn test_missing_scene_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/scenes/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "detail": "Not found: Scene gone not found",
                "code": "not_found"
            })))
            .mount(&server)
            .await;

        let scene = client(&server)
            .await
            .get_scene(&SceneId::from("gone"))
            .await
            .unwrap();
        assert!(scene.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let client = FunctionsClient::new(&ClientConfig::new("http://127.0.0.1:9")).unwrap();
        let err = client.poll(None).await.unwrap_err();
        assert!(err.is_network(), "{:?}", err);
    }
}
