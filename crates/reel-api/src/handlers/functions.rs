//! Job lifecycle endpoints called by the client.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use validator::Validate;

use reel_models::{ProjectId, SceneId, ShotType};

use crate::error::ApiResult;
use crate::services::{CancelOutcome, PollReport, SubmitOutcome, SubmitRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateSceneVideoRequest {
    #[validate(length(min = 1, max = 128))]
    pub scene_id: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub project_id: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub motion_prompt: Option<String>,
    /// Free-form storyboard framing ("Close-up", "wide shot")
    #[serde(default)]
    pub shot_type: Option<String>,
}

/// POST /functions/generate-scene-video
pub async fn generate_scene_video(
    State(state): State<AppState>,
    Json(request): Json<GenerateSceneVideoRequest>,
) -> ApiResult<Json<SubmitOutcome>> {
    request.validate()?;

    let shot_type = request.shot_type.as_deref().and_then(|raw| {
        let parsed = ShotType::parse_lenient(raw);
        if parsed.is_none() {
            debug!(shot_type = raw, "Unrecognized shot type, using the scene's");
        }
        parsed
    });

    let outcome = state
        .submission
        .submit(SubmitRequest {
            scene_id: SceneId::from(request.scene_id),
            project_id: request.project_id.map(ProjectId::from),
            image_url: request.image_url,
            motion_prompt: request.motion_prompt,
            shot_type,
        })
        .await?;

    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PollVideoStatusRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub project_id: Option<String>,
}

/// POST /functions/poll-video-status
pub async fn poll_video_status(
    State(state): State<AppState>,
    Json(request): Json<PollVideoStatusRequest>,
) -> ApiResult<Json<PollReport>> {
    request.validate()?;

    let project_id = request.project_id.map(ProjectId::from);
    let report = state
        .poller
        .poll_once(project_id.as_ref(), Utc::now())
        .await?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelVideoGenerationRequest {
    #[validate(length(min = 1, max = 128))]
    pub scene_id: String,
}

/// POST /functions/cancel-video-generation
pub async fn cancel_video_generation(
    State(state): State<AppState>,
    Json(request): Json<CancelVideoGenerationRequest>,
) -> ApiResult<Json<CancelOutcome>> {
    request.validate()?;

    let outcome = state
        .cancellation
        .cancel(&SceneId::from(request.scene_id))
        .await?;

    Ok(Json(outcome))
}
