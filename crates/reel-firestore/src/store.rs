//! Storage seams used by the job lifecycle handlers.

use async_trait::async_trait;
use reel_models::{CostEntry, ProjectId, SceneId, SceneJob, ScenePatch, VideoStatus};

use crate::error::FirestoreResult;

/// Durable scene records.
///
/// `write_if_status` and `write_if_job` are the conditional writes every
/// lifecycle transition except cancellation goes through. They return
/// `Ok(None)` when zero rows were affected: the record is missing, the
/// condition does not hold, or a concurrent writer changed it first.
#[async_trait]
pub trait SceneStore: Send + Sync {
    async fn get(&self, id: &SceneId) -> FirestoreResult<Option<SceneJob>>;

    async fn list_by_project(&self, project_id: &ProjectId) -> FirestoreResult<Vec<SceneJob>>;

    /// Records with `status == generating` and a job id, optionally scoped to a project.
    async fn list_generating(&self, project_id: Option<&ProjectId>)
        -> FirestoreResult<Vec<SceneJob>>;

    async fn create(&self, scene: &SceneJob) -> FirestoreResult<()>;

    /// Unconditional write. `Ok(None)` if the record does not exist.
    async fn write(&self, id: &SceneId, patch: &ScenePatch) -> FirestoreResult<Option<SceneJob>>;

    async fn write_if_status(
        &self,
        id: &SceneId,
        expected: &[VideoStatus],
        patch: &ScenePatch,
    ) -> FirestoreResult<Option<SceneJob>>;

    /// Conditional write on `status == generating` and `job_id == job_id`.
    async fn write_if_job(
        &self,
        id: &SceneId,
        job_id: &str,
        patch: &ScenePatch,
    ) -> FirestoreResult<Option<SceneJob>>;
}

/// True if `scene` is generating the given upstream job.
pub fn is_generating_job(scene: &SceneJob, job_id: &str) -> bool {
    scene.is_generating() && scene.job_id.as_deref() == Some(job_id)
}

/// Append-only cost log with a running total per project.
#[async_trait]
pub trait CostLedger: Send + Sync {
    async fn record(&self, entry: &CostEntry) -> FirestoreResult<()>;
}
