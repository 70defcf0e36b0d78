//! Job submission: start one upstream video job for one scene.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use reel_firestore::SceneStore;
use reel_models::{ProjectId, SceneId, ScenePatch, ShotType, VideoStatus};
use reel_queue::ChangeFeed;
use reel_video_client::{VideoApi, VideoRequest};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::prompt::compose_prompt;
use crate::services::publish_change;

/// Submission input. Missing generation inputs fall back to the stored record.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub scene_id: SceneId,
    pub project_id: Option<ProjectId>,
    pub image_url: Option<String>,
    pub motion_prompt: Option<String>,
    pub shot_type: Option<ShotType>,
}

impl SubmitRequest {
    pub fn for_scene(scene_id: SceneId) -> Self {
        Self {
            scene_id,
            project_id: None,
            image_url: None,
            motion_prompt: None,
            shot_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub scene_id: SceneId,
    pub job_id: String,
    pub status: VideoStatus,
}

pub struct JobSubmissionService {
    store: Arc<dyn SceneStore>,
    video: Arc<dyn VideoApi>,
    feed: Arc<dyn ChangeFeed>,
}

impl JobSubmissionService {
    pub fn new(
        store: Arc<dyn SceneStore>,
        video: Arc<dyn VideoApi>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self { store, video, feed }
    }

    pub async fn submit(&self, request: SubmitRequest) -> ApiResult<SubmitOutcome> {
        let span = info_span!("submit_scene_video", scene_id = %request.scene_id);
        self.submit_inner(request).instrument(span).await
    }

    async fn submit_inner(&self, request: SubmitRequest) -> ApiResult<SubmitOutcome> {
        let scene_id = request.scene_id;
        let scene = self
            .store
            .get(&scene_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Scene {} not found", scene_id)))?;

        if let Some(project_id) = &request.project_id {
            if project_id != &scene.project_id {
                return Err(ApiError::bad_request(format!(
                    "Scene {} does not belong to project {}",
                    scene_id, project_id
                )));
            }
        }

        if scene.is_generating() {
            metrics::record_submit_conflict();
            return Err(ApiError::conflict(format!(
                "Scene {} is already generating",
                scene_id
            )));
        }

        let image_url = request
            .image_url
            .or_else(|| scene.source_image_url.clone())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("Scene has no source image"))?;
        let motion = request
            .motion_prompt
            .or_else(|| scene.prompt_text.clone())
            .unwrap_or_default();
        let shot_type = request.shot_type.unwrap_or(scene.shot_type);

        let prompt = compose_prompt(shot_type, &motion);
        let job_id = match self.video.submit(&VideoRequest::new(prompt, image_url)).await {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!("Video submission failed: {}", e);
                metrics::record_job_failed("submit");
                // A job started by another session since the read is left alone.
                match self
                    .store
                    .write_if_status(
                        &scene_id,
                        &VideoStatus::SUBMITTABLE,
                        &ScenePatch::failed(e.user_message()),
                    )
                    .await
                {
                    Ok(Some(record)) => publish_change(self.feed.as_ref(), record).await,
                    Ok(None) => warn!("Scene is owned by another job, failure not recorded"),
                    Err(store_err) => error!("Failed to record submission failure: {}", store_err),
                }
                return Err(ApiError::from_video(&e));
            }
        };

        let applied = match self
            .store
            .write_if_status(
                &scene_id,
                &VideoStatus::SUBMITTABLE,
                &ScenePatch::generating(job_id.as_str()),
            )
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                error!(job_id = %job_id, "Failed to record submitted job, cancelling it: {}", e);
                self.cancel_untracked(&job_id).await;
                return Err(e.into());
            }
        };

        let Some(record) = applied else {
            // Another session moved the scene to generating first.
            warn!(job_id = %job_id, "Lost submission race, cancelling duplicate job");
            metrics::record_submit_conflict();
            self.cancel_untracked(&job_id).await;
            return Err(ApiError::conflict(format!(
                "Scene {} is already generating",
                scene_id
            )));
        };

        publish_change(self.feed.as_ref(), record).await;
        metrics::record_job_submitted();
        info!(job_id = %job_id, shot_type = shot_type.as_str(), "Scene video job submitted");

        Ok(SubmitOutcome {
            scene_id,
            job_id,
            status: VideoStatus::Generating,
        })
    }

    /// Best-effort cancel of an upstream job no record points at.
    async fn cancel_untracked(&self, job_id: &str) {
        if let Err(e) = self.video.cancel(job_id).await {
            warn!(job_id = %job_id, "Failed to cancel untracked job: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use reel_firestore::SceneStore;
    use reel_queue::ChangeFeed;

    use crate::testing::{generating_scene, pending_scene, Fail, Harness};

    #[tokio::test]
    async fn test_submit_moves_scene_to_generating() {
        let h = Harness::new([pending_scene("s1")]);
        let mut changes = h.feed.subscribe(&ProjectId::from("p1")).await.unwrap();
        h.video.on_submit(Ok("abc"));

        let outcome = h
            .state
            .submission
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap();

        assert_eq!(outcome.job_id, "abc");
        assert_eq!(outcome.status, VideoStatus::Generating);

        let scene = h.scene("s1").await;
        assert_eq!(scene.status, VideoStatus::Generating);
        assert_eq!(scene.job_id.as_deref(), Some("abc"));
        assert!(scene.error_text.is_none());
        assert!(scene.check_invariants().is_ok());

        let event = changes.next().await.unwrap();
        assert_eq!(event.record.unwrap().status, VideoStatus::Generating);
        assert_eq!(h.video.calls(), vec!["submit:https://img/s1.png"]);
    }

    #[tokio::test]
    async fn test_retry_from_failed_clears_error() {
        let mut scene = pending_scene("s1");
        scene.apply(&ScenePatch::failed("old failure"), chrono::Utc::now());
        let h = Harness::new([scene]);

        h.state
            .submission
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap();

        let scene = h.scene("s1").await;
        assert_eq!(scene.status, VideoStatus::Generating);
        assert!(scene.error_text.is_none());
    }

    #[tokio::test]
    async fn test_already_generating_is_conflict_without_upstream_call() {
        let h = Harness::new([generating_scene("s1", "abc", chrono::Utc::now())]);

        let err = h
            .state
            .submission
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(h.video.calls_to("submit"), 0);
        assert_eq!(h.scene("s1").await.job_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_missing_scene_is_not_found() {
        let h = Harness::new([]);
        let err = h
            .state
            .submission
            .submit(SubmitRequest::for_scene(SceneId::from("nope")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_project_mismatch_is_bad_request() {
        let h = Harness::new([pending_scene("s1")]);
        let mut request = SubmitRequest::for_scene(SceneId::from("s1"));
        request.project_id = Some(ProjectId::from("p2"));

        let err = h.state.submission.submit(request).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_upstream_rejection_marks_failed() {
        let h = Harness::new([pending_scene("s1")]);
        h.video.on_submit(Err(Fail::Rejected(422)));

        let err = h
            .state
            .submission
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
        let scene = h.scene("s1").await;
        assert_eq!(scene.status, VideoStatus::Failed);
        assert!(scene.error_text.unwrap().contains("422"));
        assert!(scene.job_id.is_none());
    }

    #[tokio::test]
    async fn test_upstream_timeout_is_gateway_timeout() {
        let h = Harness::new([pending_scene("s1")]);
        h.video.on_submit(Err(Fail::Timeout));

        let err = h
            .state
            .submission
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(h.scene("s1").await.status, VideoStatus::Failed);
    }

    #[tokio::test]
    async fn test_request_inputs_override_record() {
        let h = Harness::new([pending_scene("s1")]);
        let mut request = SubmitRequest::for_scene(SceneId::from("s1"));
        request.image_url = Some("https://img/override.png".to_string());

        h.state.submission.submit(request).await.unwrap();
        assert_eq!(h.video.calls(), vec!["submit:https://img/override.png"]);
    }

    #[tokio::test]
    async fn test_scene_without_image_is_bad_request() {
        let h = Harness::new([reel_models::SceneJob::new(
            SceneId::from("s1"),
            ProjectId::from("p1"),
        )]);

        let err = h
            .state
            .submission
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(h.video.calls_to("submit"), 0);
    }

    /// How [`RacingStore`] answers conditional writes.
    #[derive(Clone, Copy)]
    enum Cas {
        /// Apply to the real row
        Real,
        /// Report zero rows, as if another session won
        Lose,
        /// Fail with a store error
        Error,
    }

    /// In-memory store that can serve a stale read and script its CAS outcome.
    struct RacingStore {
        inner: reel_firestore::InMemorySceneStore,
        stale: Option<reel_models::SceneJob>,
        cas: Cas,
    }

    impl RacingStore {
        fn new(real: reel_models::SceneJob, cas: Cas) -> Self {
            Self {
                inner: reel_firestore::InMemorySceneStore::with_scenes([real]),
                stale: None,
                cas,
            }
        }

        fn with_stale_read(mut self, stale: reel_models::SceneJob) -> Self {
            self.stale = Some(stale);
            self
        }
    }

    #[async_trait::async_trait]
    impl SceneStore for RacingStore {
        async fn get(
            &self,
            id: &SceneId,
        ) -> reel_firestore::FirestoreResult<Option<reel_models::SceneJob>> {
            match &self.stale {
                Some(stale) => Ok(Some(stale.clone())),
                None => self.inner.get(id).await,
            }
        }
        async fn list_by_project(
            &self,
            project_id: &ProjectId,
        ) -> reel_firestore::FirestoreResult<Vec<reel_models::SceneJob>> {
            self.inner.list_by_project(project_id).await
        }
        async fn list_generating(
            &self,
            project_id: Option<&ProjectId>,
        ) -> reel_firestore::FirestoreResult<Vec<reel_models::SceneJob>> {
            self.inner.list_generating(project_id).await
        }
        async fn create(&self, scene: &reel_models::SceneJob) -> reel_firestore::FirestoreResult<()> {
            self.inner.create(scene).await
        }
        async fn write(
            &self,
            id: &SceneId,
            patch: &ScenePatch,
        ) -> reel_firestore::FirestoreResult<Option<reel_models::SceneJob>> {
            self.inner.write(id, patch).await
        }
        async fn write_if_status(
            &self,
            id: &SceneId,
            expected: &[VideoStatus],
            patch: &ScenePatch,
        ) -> reel_firestore::FirestoreResult<Option<reel_models::SceneJob>> {
            match self.cas {
                Cas::Real => self.inner.write_if_status(id, expected, patch).await,
                Cas::Lose => Ok(None),
                Cas::Error => Err(reel_firestore::FirestoreError::request_failed("unavailable")),
            }
        }
        async fn write_if_job(
            &self,
            id: &SceneId,
            job_id: &str,
            patch: &ScenePatch,
        ) -> reel_firestore::FirestoreResult<Option<reel_models::SceneJob>> {
            self.inner.write_if_job(id, job_id, patch).await
        }
    }

    fn service_with(
        store: Arc<RacingStore>,
        video: Arc<crate::testing::ScriptedVideoApi>,
    ) -> JobSubmissionService {
        JobSubmissionService::new(store, video, Arc::new(reel_queue::LocalChangeFeed::default()))
    }

    #[tokio::test]
    async fn test_lost_race_cancels_new_job() {
        let store = Arc::new(RacingStore::new(pending_scene("s1"), Cas::Lose));
        let video = crate::testing::ScriptedVideoApi::new();
        video.on_submit(Ok("dup"));
        let service = service_with(store, video.clone());

        let err = service
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(
            video.calls(),
            vec!["submit:https://img/s1.png", "cancel:dup"]
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_leaves_concurrent_job_untouched() {
        // The read still sees pending, but another session has since started a job.
        let live = generating_scene("s1", "other-job", chrono::Utc::now());
        let store = Arc::new(
            RacingStore::new(live, Cas::Real).with_stale_read(pending_scene("s1")),
        );
        let video = crate::testing::ScriptedVideoApi::new();
        video.on_submit(Err(Fail::Rejected(422)));
        let service = service_with(store.clone(), video);

        let err = service
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
        let row = store.inner.get(&SceneId::from("s1")).await.unwrap().unwrap();
        assert_eq!(row.status, VideoStatus::Generating);
        assert_eq!(row.job_id.as_deref(), Some("other-job"));
        assert!(row.error_text.is_none());
        assert_eq!(store.list_generating(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_error_after_submit_cancels_job() {
        let store = Arc::new(RacingStore::new(pending_scene("s1"), Cas::Error));
        let video = crate::testing::ScriptedVideoApi::new();
        video.on_submit(Ok("billed-job"));
        let service = service_with(store.clone(), video.clone());

        let err = service
            .submit(SubmitRequest::for_scene(SceneId::from("s1")))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Firestore(_)));
        assert_eq!(
            video.calls(),
            vec!["submit:https://img/s1.png", "cancel:billed-job"]
        );
        let row = store.inner.get(&SceneId::from("s1")).await.unwrap().unwrap();
        assert_eq!(row.status, VideoStatus::Pending);
        assert!(row.job_id.is_none());
    }
}
