//! Scene reads used by the client for refetches and re-checks.

use axum::extract::{Path, State};
use axum::Json;

use reel_models::{ProjectId, SceneId, SceneJob};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/projects/:project_id/scenes
pub async fn list_project_scenes(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<SceneJob>>> {
    let scenes = state
        .store
        .list_by_project(&ProjectId::from(project_id))
        .await?;
    Ok(Json(scenes))
}

/// GET /api/scenes/:scene_id
pub async fn get_scene(
    State(state): State<AppState>,
    Path(scene_id): Path<String>,
) -> ApiResult<Json<SceneJob>> {
    let scene_id = SceneId::from(scene_id);
    state
        .store
        .get(&scene_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Scene {} not found", scene_id)))
}
