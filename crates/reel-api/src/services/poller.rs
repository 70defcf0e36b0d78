//! Job status poller: reconcile generating scenes against the video service.
//!
//! Every terminal write is conditional on the record still generating the
//! same upstream job, so overlapping cycles (client-triggered and background)
//! apply each outcome once. A scene resubmitted mid-cycle is left alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use reel_firestore::{CostLedger, SceneStore};
use reel_models::{
    CostEntry, ProjectId, SceneId, SceneJob, ScenePatch, SceneUpdate, TIMEOUT_ERROR_TEXT,
};
use reel_queue::ChangeFeed;
use reel_video_client::{UpstreamStatus, VideoApi};

use crate::config::JobConfig;
use crate::error::ApiResult;
use crate::metrics;
use crate::services::publish_change;

const DEFAULT_FAILURE_TEXT: &str = "Video generation failed";
const MISSING_OUTPUT_TEXT: &str = "Video service returned no output";

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub stale_threshold: Duration,
    pub concurrency: usize,
    pub cost_per_clip: f64,
    pub cost_service: String,
}

impl From<&JobConfig> for PollerConfig {
    fn from(jobs: &JobConfig) -> Self {
        Self {
            stale_threshold: jobs.stale_threshold,
            concurrency: jobs.poll_concurrency.max(1),
            cost_per_clip: jobs.cost_per_clip,
            cost_service: jobs.cost_service.clone(),
        }
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollReport {
    /// Generating records examined
    pub checked: usize,
    /// Records whose state this cycle changed
    pub updates: Vec<SceneUpdate>,
}

pub struct JobStatusPoller {
    store: Arc<dyn SceneStore>,
    video: Arc<dyn VideoApi>,
    ledger: Arc<dyn CostLedger>,
    feed: Arc<dyn ChangeFeed>,
    config: PollerConfig,
}

impl JobStatusPoller {
    pub fn new(
        store: Arc<dyn SceneStore>,
        video: Arc<dyn VideoApi>,
        ledger: Arc<dyn CostLedger>,
        feed: Arc<dyn ChangeFeed>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            video,
            ledger,
            feed,
            config,
        }
    }

    /// Run one reconciliation cycle over every generating record, optionally
    /// limited to one project. Only the initial listing can fail the cycle.
    pub async fn poll_once(
        &self,
        project_id: Option<&ProjectId>,
        now: DateTime<Utc>,
    ) -> ApiResult<PollReport> {
        let scenes = self.store.list_generating(project_id).await?;
        let checked = scenes.len();
        if checked == 0 {
            return Ok(PollReport::default());
        }

        let updates: Vec<SceneUpdate> = stream::iter(scenes)
            .map(|scene| self.reconcile(scene, now))
            .buffer_unordered(self.config.concurrency)
            .filter_map(|update| async move { update })
            .collect()
            .await;

        metrics::record_poll_cycle(checked, updates.len());
        if !updates.is_empty() {
            info!(checked, updated = updates.len(), "Poll cycle applied updates");
        }

        Ok(PollReport { checked, updates })
    }

    async fn reconcile(&self, scene: SceneJob, now: DateTime<Utc>) -> Option<SceneUpdate> {
        let job_id = scene.job_id.clone()?;
        let span = info_span!("reconcile_scene", scene_id = %scene.id, job_id = %job_id);

        async move {
            if self.is_stale(&scene, now) {
                return self.reset_stuck(&scene, &job_id).await;
            }

            let status = match self.video.status(&job_id).await {
                Ok(status) => status,
                Err(e) => {
                    // Left for the next cycle
                    warn!("Status check failed: {}", e);
                    return None;
                }
            };

            match status {
                UpstreamStatus::InQueue | UpstreamStatus::InProgress => None,
                UpstreamStatus::Completed => match self.video.result(&job_id).await {
                    Ok(output) => match output.video_url {
                        Some(url) => self.complete(&scene, &job_id, url).await,
                        None => self.fail(&scene, &job_id, MISSING_OUTPUT_TEXT).await,
                    },
                    Err(e) => {
                        warn!("Result fetch failed: {}", e);
                        None
                    }
                },
                UpstreamStatus::Failed { error } => {
                    let text = error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE_TEXT.to_string());
                    self.fail(&scene, &job_id, &text).await
                }
            }
        }
        .instrument(span)
        .await
    }

    fn is_stale(&self, scene: &SceneJob, now: DateTime<Utc>) -> bool {
        // Negative ages (clock skew) are never stale.
        scene
            .age(now)
            .to_std()
            .map_or(false, |age| age > self.config.stale_threshold)
    }

    async fn reset_stuck(&self, scene: &SceneJob, job_id: &str) -> Option<SceneUpdate> {
        self.commit(&scene.id, job_id, &ScenePatch::timed_out())
            .await?;
        warn!(
            age_secs = scene.age(Utc::now()).num_seconds(),
            "Reset stuck scene video job"
        );
        metrics::record_job_timed_out();
        Some(SceneUpdate::timed_out(scene.id.clone(), TIMEOUT_ERROR_TEXT))
    }

    async fn complete(&self, scene: &SceneJob, job_id: &str, url: String) -> Option<SceneUpdate> {
        self.commit(&scene.id, job_id, &ScenePatch::done(url.as_str()))
            .await?;

        let entry = CostEntry::new(
            scene.project_id.clone(),
            self.config.cost_service.as_str(),
            "image_to_video",
            self.config.cost_per_clip,
        )
        .for_scene(scene.id.clone());
        if let Err(e) = self.ledger.record(&entry).await {
            error!("Failed to record video cost: {}", e);
        }

        metrics::record_job_completed();
        info!(result_url = %url, "Scene video completed");
        Some(SceneUpdate::completed(scene.id.clone(), url))
    }

    async fn fail(&self, scene: &SceneJob, job_id: &str, text: &str) -> Option<SceneUpdate> {
        self.commit(&scene.id, job_id, &ScenePatch::failed(text))
            .await?;
        metrics::record_job_failed("upstream");
        info!(error_text = text, "Scene video failed upstream");
        Some(SceneUpdate::failed(scene.id.clone(), text))
    }

    /// Conditional write plus change notification. `None` when another
    /// writer got there first or the store call failed.
    async fn commit(&self, id: &SceneId, job_id: &str, patch: &ScenePatch) -> Option<SceneJob> {
        match self.store.write_if_job(id, job_id, patch).await {
            Ok(Some(record)) => {
                publish_change(self.feed.as_ref(), record.clone()).await;
                Some(record)
            }
            Ok(None) => {
                debug!("Scene already handled by another writer");
                None
            }
            Err(e) => {
                error!("Failed to write scene update: {}", e);
                None
            }
        }
    }
}
