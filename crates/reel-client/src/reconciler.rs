//! Client reconciliation for one project's scenes.
//!
//! Three update sources feed the cache: the user's own mutations (applied
//! optimistically and rolled back on failure), realtime change events (ignored
//! during the cooldown after a local mutation), and a fallback poll loop that
//! runs only while some scene has a job outstanding.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use reel_models::{ChangeEvent, ProjectId, SceneId, SceneJob, ScenePatch, SceneUpdate, VideoStatus};
use reel_queue::{ChangeStream, SerialQueue};

use crate::backend::{CancelResponse, GenerateRequest, GenerateResponse, SceneBackend};
use crate::cache::SceneCache;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::polling::{PollingMachine, PollingState, Transition};

/// User-facing event, e.g. for a toast.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneNotice {
    Completed { scene_id: SceneId, result_url: String },
    Failed { scene_id: SceneId, message: String },
    TimedOut { scene_id: SceneId, message: String },
    Cancelled { scene_id: SceneId },
}

impl SceneNotice {
    fn from_update(update: &SceneUpdate) -> Option<Self> {
        let scene_id = update.scene_id.clone();
        let message = update.error_text.clone().unwrap_or_default();
        match (update.status, update.timed_out) {
            (_, true) => Some(SceneNotice::TimedOut { scene_id, message }),
            (VideoStatus::Done, false) => Some(SceneNotice::Completed {
                scene_id,
                result_url: update.result_url.clone().unwrap_or_default(),
            }),
            (VideoStatus::Failed, false) => Some(SceneNotice::Failed { scene_id, message }),
            _ => None,
        }
    }
}

/// How a submission ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The server accepted the job
    Submitted(GenerateResponse),
    /// The call failed in transit, but the re-read shows the job was started
    Confirmed(SceneJob),
}

pub struct SceneReconciler {
    project_id: ProjectId,
    backend: Arc<dyn SceneBackend>,
    queue: SerialQueue,
    config: ClientConfig,
    cache: Mutex<SceneCache>,
    machine: Mutex<PollingMachine>,
    notices: mpsc::UnboundedSender<SceneNotice>,
}

impl SceneReconciler {
    pub fn new(
        project_id: ProjectId,
        backend: Arc<dyn SceneBackend>,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SceneNotice>) {
        let queue = SerialQueue::new(config.queue_delay);
        Self::with_queue(project_id, backend, config, queue)
    }

    /// Share a submission queue with other reconcilers.
    pub fn with_queue(
        project_id: ProjectId,
        backend: Arc<dyn SceneBackend>,
        config: ClientConfig,
        queue: SerialQueue,
    ) -> (Self, mpsc::UnboundedReceiver<SceneNotice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        let reconciler = Self {
            project_id,
            backend,
            queue,
            config,
            cache: Mutex::new(SceneCache::new()),
            machine: Mutex::new(PollingMachine::new()),
            notices,
        };
        (reconciler, rx)
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub async fn scenes(&self) -> Vec<SceneJob> {
        self.cache.lock().await.scenes()
    }

    pub async fn scene(&self, id: &SceneId) -> Option<SceneJob> {
        self.cache.lock().await.get(id).cloned()
    }

    pub async fn polling_state(&self) -> PollingState {
        self.machine.lock().await.state()
    }

    /// Full refetch of the project's scenes.
    pub async fn refresh(&self) -> ClientResult<()> {
        let scenes = self.backend.list_scenes(&self.project_id).await?;
        let outstanding = {
            let mut cache = self.cache.lock().await;
            cache.replace_all(scenes);
            cache.outstanding()
        };
        self.observe(outstanding).await;
        Ok(())
    }

    /// Submit a scene through the serial queue.
    ///
    /// Refused while the scene is generating or already being submitted. A
    /// network-class failure is re-checked against the server before it is
    /// reported, since the job may have started anyway.
    pub async fn submit(&self, request: GenerateRequest) -> ClientResult<SubmitOutcome> {
        let scene_id = request.scene_id.clone();
        let outstanding = {
            let mut cache = self.cache.lock().await;
            match cache.get(&scene_id) {
                None => return Err(ClientError::UnknownScene(scene_id)),
                Some(scene) if scene.is_generating() => {
                    return Err(ClientError::SceneBusy(scene_id))
                }
                Some(_) => {}
            }
            if !cache.begin_submit(&scene_id) {
                return Err(ClientError::SceneBusy(scene_id));
            }
            cache.touch();
            cache.outstanding()
        };
        self.observe(outstanding).await;

        let backend = Arc::clone(&self.backend);
        let result = self
            .queue
            .enqueue(move || async move { backend.generate(&request).await })
            .await;

        let outcome = match result {
            Ok(response) => {
                let mut cache = self.cache.lock().await;
                cache.apply(&scene_id, &ScenePatch::generating(response.job_id.as_str()));
                info!(scene_id = %scene_id, job_id = %response.job_id, "Scene video submitted");
                Ok(SubmitOutcome::Submitted(response))
            }
            Err(e) if e.is_network() => self.recheck_after_network_error(&scene_id, e).await,
            Err(e) => {
                // The server may have recorded the failure on the scene.
                self.sync_scene(&scene_id).await;
                Err(e)
            }
        };

        let outstanding = {
            let mut cache = self.cache.lock().await;
            cache.end_submit(&scene_id);
            cache.outstanding()
        };
        self.observe(outstanding).await;

        if let Err(e) = &outcome {
            self.notify(SceneNotice::Failed {
                scene_id,
                message: e.to_string(),
            });
        }
        outcome
    }

    async fn recheck_after_network_error(
        &self,
        scene_id: &SceneId,
        error: ClientError,
    ) -> ClientResult<SubmitOutcome> {
        warn!(scene_id = %scene_id, "Submit failed in transit, re-checking: {}", error);
        tokio::time::sleep(self.config.network_recheck_delay).await;

        match self.backend.get_scene(scene_id).await {
            Ok(Some(scene)) => {
                let started = matches!(scene.status, VideoStatus::Generating | VideoStatus::Done);
                self.cache.lock().await.upsert(scene.clone());
                if started {
                    info!(scene_id = %scene_id, status = %scene.status, "Submit reached the server");
                    Ok(SubmitOutcome::Confirmed(scene))
                } else {
                    Err(error)
                }
            }
            Ok(None) => Err(error),
            Err(recheck) => {
                warn!(scene_id = %scene_id, "Re-check failed: {}", recheck);
                Err(error)
            }
        }
    }

    async fn sync_scene(&self, scene_id: &SceneId) {
        match self.backend.get_scene(scene_id).await {
            Ok(Some(scene)) => self.cache.lock().await.upsert(scene),
            Ok(None) => {}
            Err(e) => debug!(scene_id = %scene_id, "Scene sync failed: {}", e),
        }
    }

    /// Optimistically reset the scene, rolling back if the server call fails.
    pub async fn cancel(&self, scene_id: &SceneId) -> ClientResult<CancelResponse> {
        let (snapshot, outstanding) = {
            let mut cache = self.cache.lock().await;
            let snapshot = cache
                .snapshot(scene_id)
                .ok_or_else(|| ClientError::UnknownScene(scene_id.clone()))?;
            cache.apply(scene_id, &ScenePatch::reset());
            cache.touch();
            (snapshot, cache.outstanding())
        };
        self.observe(outstanding).await;

        match self.backend.cancel(scene_id).await {
            Ok(response) => {
                // A refetch may have landed while the call was in flight.
                let outstanding = {
                    let mut cache = self.cache.lock().await;
                    cache.apply(scene_id, &ScenePatch::reset());
                    cache.outstanding()
                };
                self.observe(outstanding).await;
                self.notify(SceneNotice::Cancelled {
                    scene_id: scene_id.clone(),
                });
                Ok(response)
            }
            Err(e) => {
                warn!(scene_id = %scene_id, "Cancel failed, rolling back: {}", e);
                let outstanding = {
                    let mut cache = self.cache.lock().await;
                    cache.restore(snapshot);
                    cache.outstanding()
                };
                self.observe(outstanding).await;
                Err(e)
            }
        }
    }

    /// React to a realtime event. Returns true if it triggered a refetch.
    pub async fn handle_change(&self, event: &ChangeEvent) -> ClientResult<bool> {
        if event.project_id != self.project_id {
            return Ok(false);
        }
        if self.cache.lock().await.in_cooldown(self.config.cooldown) {
            debug!(scene_id = %event.scene_id, "Realtime change ignored during cooldown");
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// One fallback cycle: ask the server to poll, fold in its updates, refetch.
    /// Does nothing while idle. Returns true if it ran.
    pub async fn poll_tick(&self) -> ClientResult<bool> {
        if !self.machine.lock().await.is_polling() {
            return Ok(false);
        }

        let report = self.backend.poll(Some(&self.project_id)).await?;
        {
            let mut cache = self.cache.lock().await;
            for update in &report.updates {
                cache.apply_update(update);
            }
        }
        for notice in report.updates.iter().filter_map(SceneNotice::from_update) {
            self.notify(notice);
        }

        self.refresh().await?;
        Ok(true)
    }

    /// Drive realtime handling and the fallback loop until the task is dropped.
    pub async fn run(&self, changes: Option<ChangeStream>) {
        let mut changes = changes;
        let mut ticker = interval(self.config.fallback_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            let wake = tokio::select! {
                event = next_change(&mut changes) => Wake::Change(event),
                _ = ticker.tick() => Wake::Tick,
            };

            match wake {
                Wake::Change(Some(event)) => {
                    if let Err(e) = self.handle_change(&event).await {
                        warn!("Realtime refetch failed: {}", e);
                    }
                }
                Wake::Change(None) => {
                    info!(project_id = %self.project_id, "Realtime feed closed, relying on polling");
                    changes = None;
                }
                Wake::Tick => {
                    if let Err(e) = self.poll_tick().await {
                        warn!("Fallback poll failed: {}", e);
                    }
                }
            }
        }
    }

    async fn observe(&self, outstanding: usize) {
        let transition = self.machine.lock().await.observe(outstanding);
        match transition {
            Some(Transition::Started) => {
                debug!(project_id = %self.project_id, outstanding, "Fallback polling started")
            }
            Some(Transition::Stopped) => {
                debug!(project_id = %self.project_id, "Fallback polling stopped")
            }
            None => {}
        }
    }

    fn notify(&self, notice: SceneNotice) {
        // Nobody listening is fine.
        let _ = self.notices.send(notice);
    }
}

enum Wake {
    Change(Option<ChangeEvent>),
    Tick,
}

async fn next_change(changes: &mut Option<ChangeStream>) -> Option<ChangeEvent> {
    match changes {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
