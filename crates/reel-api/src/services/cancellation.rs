//! Job cancellation: best-effort upstream cancel, then an unconditional local reset.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use reel_firestore::SceneStore;
use reel_models::{SceneId, ScenePatch, VideoStatus};
use reel_queue::ChangeFeed;
use reel_video_client::VideoApi;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::publish_change;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelOutcome {
    pub scene_id: SceneId,
    pub status: VideoStatus,
    /// Whether the video service acknowledged the cancel
    pub upstream_cancelled: bool,
}

pub struct JobCancellationService {
    store: Arc<dyn SceneStore>,
    video: Arc<dyn VideoApi>,
    feed: Arc<dyn ChangeFeed>,
}

impl JobCancellationService {
    pub fn new(
        store: Arc<dyn SceneStore>,
        video: Arc<dyn VideoApi>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self { store, video, feed }
    }

    /// Leave the scene pending with no job state. Upstream errors never
    /// prevent the reset; only a missing record is an error.
    pub async fn cancel(&self, scene_id: &SceneId) -> ApiResult<CancelOutcome> {
        let span = info_span!("cancel_scene_video", scene_id = %scene_id);
        self.cancel_inner(scene_id).instrument(span).await
    }

    async fn cancel_inner(&self, scene_id: &SceneId) -> ApiResult<CancelOutcome> {
        let scene = self
            .store
            .get(scene_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Scene {} not found", scene_id)))?;

        let upstream_cancelled = match scene.job_id.as_deref() {
            Some(job_id) => match self.video.cancel(job_id).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(job_id, "Upstream cancel failed, resetting anyway: {}", e);
                    false
                }
            },
            None => false,
        };

        let record = self
            .store
            .write(scene_id, &ScenePatch::reset())
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Scene {} not found", scene_id)))?;
        publish_change(self.feed.as_ref(), record).await;

        metrics::record_job_cancelled(upstream_cancelled);
        info!(upstream_cancelled, previous = %scene.status, "Scene video cancelled");

        Ok(CancelOutcome {
            scene_id: scene_id.clone(),
            status: VideoStatus::Pending,
            upstream_cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::testing::{generating_scene, pending_scene, Fail, Harness};

    async fn assert_clean_pending(h: &Harness, id: &str) {
        let scene = h.scene(id).await;
        assert_eq!(scene.status, VideoStatus::Pending);
        assert!(scene.job_id.is_none());
        assert!(scene.result_url.is_none());
        assert!(scene.error_text.is_none());
    }

    #[tokio::test]
    async fn test_cancel_generating_job() {
        let h = Harness::new([generating_scene("s1", "abc", Utc::now())]);

        let outcome = h.state.cancellation.cancel(&SceneId::from("s1")).await.unwrap();

        assert!(outcome.upstream_cancelled);
        assert_eq!(outcome.status, VideoStatus::Pending);
        assert_eq!(h.video.calls(), vec!["cancel:abc"]);
        assert_clean_pending(&h, "s1").await;
    }

    #[tokio::test]
    async fn test_cancel_resets_even_when_upstream_fails() {
        for fail in [Fail::Timeout, Fail::Rejected(404), Fail::Rejected(500)] {
            let h = Harness::new([generating_scene("s1", "abc", Utc::now())]);
            h.video.fail_cancel(fail);

            let outcome = h.state.cancellation.cancel(&SceneId::from("s1")).await.unwrap();

            assert!(!outcome.upstream_cancelled);
            assert_clean_pending(&h, "s1").await;
        }
    }

    #[tokio::test]
    async fn test_cancel_without_job_skips_upstream() {
        let mut scene = pending_scene("s1");
        scene.apply(&ScenePatch::failed("boom"), Utc::now());
        let h = Harness::new([scene]);

        let outcome = h.state.cancellation.cancel(&SceneId::from("s1")).await.unwrap();

        assert!(!outcome.upstream_cancelled);
        assert!(h.video.calls().is_empty());
        assert_clean_pending(&h, "s1").await;
    }

    #[tokio::test]
    async fn test_cancel_missing_scene_is_not_found() {
        let h = Harness::new([]);
        let err = h.state.cancellation.cancel(&SceneId::from("nope")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
