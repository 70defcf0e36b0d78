//! Server calls made by the reconciler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reel_models::{ProjectId, SceneId, SceneJob, SceneUpdate, VideoStatus};

use crate::error::ClientResult;

/// Body of `generate-scene-video`. Unset inputs fall back to the stored scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub scene_id: SceneId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shot_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateResponse {
    pub scene_id: SceneId,
    pub job_id: String,
    pub status: VideoStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PollResponse {
    pub checked: usize,
    #[serde(default)]
    pub updates: Vec<SceneUpdate>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CancelResponse {
    pub scene_id: SceneId,
    pub status: VideoStatus,
    #[serde(default)]
    pub upstream_cancelled: bool,
}

#[async_trait]
pub trait SceneBackend: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> ClientResult<GenerateResponse>;

    async fn poll(&self, project_id: Option<&ProjectId>) -> ClientResult<PollResponse>;

    async fn cancel(&self, scene_id: &SceneId) -> ClientResult<CancelResponse>;

    /// `Ok(None)` when the scene does not exist.
    async fn get_scene(&self, scene_id: &SceneId) -> ClientResult<Option<SceneJob>>;

    async fn list_scenes(&self, project_id: &ProjectId) -> ClientResult<Vec<SceneJob>>;
}
