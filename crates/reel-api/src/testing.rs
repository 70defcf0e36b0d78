//! Test doubles shared by service and router tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use reel_firestore::{InMemoryCostLedger, InMemorySceneStore};
use reel_models::{ProjectId, SceneId, SceneJob, ScenePatch, ShotType};
use reel_queue::LocalChangeFeed;
use reel_video_client::{UpstreamStatus, VideoApi, VideoApiError, VideoApiResult, VideoOutput, VideoRequest};

use crate::config::ApiConfig;
use crate::state::AppState;

/// Scripted failure, turned into a fresh `VideoApiError` per call.
#[derive(Debug, Clone, Copy)]
pub enum Fail {
    Timeout,
    Rejected(u16),
}

impl Fail {
    fn into_error(self, operation: &'static str) -> VideoApiError {
        match self {
            Fail::Timeout => VideoApiError::Timeout {
                operation,
                after: Duration::from_secs(15),
            },
            Fail::Rejected(status) => VideoApiError::Rejected {
                operation,
                status,
                body: format!("{} rejected", operation),
            },
        }
    }
}

#[derive(Default)]
struct Script {
    submits: VecDeque<Result<String, Fail>>,
    statuses: HashMap<String, Result<UpstreamStatus, Fail>>,
    results: HashMap<String, Result<VideoOutput, Fail>>,
    cancel: Option<Fail>,
    calls: Vec<String>,
}

/// `VideoApi` answering from a script and recording every call.
#[derive(Default)]
pub struct ScriptedVideoApi {
    script: Mutex<Script>,
}

impl ScriptedVideoApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_submit(&self, outcome: Result<&str, Fail>) {
        self.script
            .lock()
            .unwrap()
            .submits
            .push_back(outcome.map(str::to_string));
    }

    pub fn on_status(&self, job_id: &str, outcome: Result<UpstreamStatus, Fail>) {
        self.script
            .lock()
            .unwrap()
            .statuses
            .insert(job_id.to_string(), outcome);
    }

    pub fn on_result(&self, job_id: &str, outcome: Result<Option<&str>, Fail>) {
        let outcome = outcome.map(|url| VideoOutput {
            video_url: url.map(str::to_string),
        });
        self.script
            .lock()
            .unwrap()
            .results
            .insert(job_id.to_string(), outcome);
    }

    /// Fully completed upstream job with an output clip.
    pub fn completes(&self, job_id: &str, url: &str) {
        self.on_status(job_id, Ok(UpstreamStatus::Completed));
        self.on_result(job_id, Ok(Some(url)));
    }

    pub fn fail_cancel(&self, fail: Fail) {
        self.script.lock().unwrap().cancel = Some(fail);
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }
}

#[async_trait]
impl VideoApi for ScriptedVideoApi {
    async fn submit(&self, request: &VideoRequest) -> VideoApiResult<String> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("submit:{}", request.image_url));
        let n = script.calls.len();
        match script.submits.pop_front() {
            Some(outcome) => outcome.map_err(|f| f.into_error("submit")),
            None => Ok(format!("job-{}", n)),
        }
    }

    async fn status(&self, job_id: &str) -> VideoApiResult<UpstreamStatus> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("status:{}", job_id));
        match script.statuses.get(job_id) {
            Some(outcome) => outcome.clone().map_err(|f| f.into_error("status")),
            None => Ok(UpstreamStatus::InProgress),
        }
    }

    async fn result(&self, job_id: &str) -> VideoApiResult<VideoOutput> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("result:{}", job_id));
        match script.results.get(job_id) {
            Some(outcome) => outcome.clone().map_err(|f| f.into_error("result")),
            None => Err(VideoApiError::invalid_response("no scripted result")),
        }
    }

    async fn cancel(&self, job_id: &str) -> VideoApiResult<()> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("cancel:{}", job_id));
        match script.cancel {
            Some(fail) => Err(fail.into_error("cancel")),
            None => Ok(()),
        }
    }
}

/// Pending scene with generation inputs in project `p1`.
pub fn pending_scene(id: &str) -> SceneJob {
    SceneJob::new(SceneId::from(id), ProjectId::from("p1")).with_inputs(
        format!("https://img/{}.png", id),
        "the singer looks up at the rain",
        ShotType::Medium,
    )
}

/// Scene generating `job_id`, last transition at `since`.
pub fn generating_scene(id: &str, job_id: &str, since: DateTime<Utc>) -> SceneJob {
    let mut scene = pending_scene(id);
    scene.apply(&ScenePatch::generating(job_id), since);
    scene
}

/// Collaborators wired together the way the server wires them.
pub struct Harness {
    pub store: Arc<InMemorySceneStore>,
    pub ledger: Arc<InMemoryCostLedger>,
    pub feed: Arc<LocalChangeFeed>,
    pub video: Arc<ScriptedVideoApi>,
    pub state: AppState,
}

impl Harness {
    pub fn new(scenes: impl IntoIterator<Item = SceneJob>) -> Self {
        let mut config = ApiConfig::default();
        config.jobs.background_poll = false;

        let store = Arc::new(InMemorySceneStore::with_scenes(scenes));
        let ledger = Arc::new(InMemoryCostLedger::new());
        let feed = Arc::new(LocalChangeFeed::default());
        let video = ScriptedVideoApi::new();
        let state = AppState::from_parts(
            config,
            store.clone(),
            video.clone(),
            ledger.clone(),
            feed.clone(),
        );

        Self {
            store,
            ledger,
            feed,
            video,
            state,
        }
    }

    pub async fn scene(&self, id: &str) -> SceneJob {
        use reel_firestore::SceneStore;
        self.store.get(&SceneId::from(id)).await.unwrap().unwrap()
    }
}
