//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use reel_firestore::{
    CostLedger, FirestoreClient, FirestoreCostLedger, FirestoreSceneStore, InMemoryCostLedger,
    InMemorySceneStore, SceneStore,
};
use reel_queue::{ChangeFeed, LocalChangeFeed, RedisChangeFeed};
use reel_video_client::{QueueVideoClient, VideoApi};

use crate::config::{ApiConfig, StoreBackend};
use crate::services::{JobCancellationService, JobStatusPoller, JobSubmissionService, PollerConfig};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn SceneStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub submission: Arc<JobSubmissionService>,
    pub poller: Arc<JobStatusPoller>,
    pub cancellation: Arc<JobCancellationService>,
}

impl AppState {
    /// Build collaborators from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let (store, ledger): (Arc<dyn SceneStore>, Arc<dyn CostLedger>) = match config.scene_store
        {
            StoreBackend::Firestore => {
                let client = FirestoreClient::from_env().context("Firestore client")?;
                info!(
                    project_id = %client.config().project_id,
                    "Using Firestore scene store"
                );
                (
                    Arc::new(FirestoreSceneStore::new(client.clone())),
                    Arc::new(FirestoreCostLedger::new(client)),
                )
            }
            StoreBackend::Memory => {
                info!("Using in-memory scene store");
                (
                    Arc::new(InMemorySceneStore::new()),
                    Arc::new(InMemoryCostLedger::new()),
                )
            }
        };

        let video = QueueVideoClient::from_env().context("video API client")?;
        info!(model = %video.config().model, "Video API client ready");

        let feed: Arc<dyn ChangeFeed> = match &config.redis_url {
            Some(url) => {
                info!("Publishing scene changes to Redis");
                Arc::new(RedisChangeFeed::new(url).context("Redis change feed")?)
            }
            None => {
                info!("REDIS_URL not set, using in-process change feed");
                Arc::new(LocalChangeFeed::default())
            }
        };

        Ok(Self::from_parts(config, store, Arc::new(video), ledger, feed))
    }

    /// Wire services around explicit collaborators.
    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn SceneStore>,
        video: Arc<dyn VideoApi>,
        ledger: Arc<dyn CostLedger>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        let submission = JobSubmissionService::new(store.clone(), video.clone(), feed.clone());
        let poller = JobStatusPoller::new(
            store.clone(),
            video.clone(),
            ledger,
            feed.clone(),
            PollerConfig::from(&config.jobs),
        );
        let cancellation = JobCancellationService::new(store.clone(), video, feed.clone());

        Self {
            config,
            store,
            feed,
            submission: Arc::new(submission),
            poller: Arc::new(poller),
            cancellation: Arc::new(cancellation),
        }
    }
}
