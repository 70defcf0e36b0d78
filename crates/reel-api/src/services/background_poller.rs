//! Background service that runs poll cycles on a timer.
//!
//! Jobs keep reconciling (and stuck ones keep getting reset) when no client
//! has the project open. Cycles overlapping with client-triggered polls are
//! safe because every terminal write is conditional.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::config::JobConfig;
use crate::services::JobStatusPoller;

pub struct BackgroundPoller {
    poller: Arc<JobStatusPoller>,
    interval: Duration,
    enabled: bool,
}

impl BackgroundPoller {
    pub fn new(poller: Arc<JobStatusPoller>, jobs: &JobConfig) -> Self {
        Self {
            poller,
            interval: jobs.background_poll_interval,
            enabled: jobs.background_poll,
        }
    }

    /// Run forever. Spawn as a background task.
    pub async fn run(self) {
        if !self.enabled {
            info!("Background video polling is disabled");
            return;
        }

        info!("Starting background video poller (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.run_cycle().await {
                error!("Background poll cycle failed: {:#}", e);
            }
        }
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        let report = self.poller.poll_once(None, Utc::now()).await?;
        if !report.updates.is_empty() {
            info!(
                "Background poll: {} checked, {} updated",
                report.checked,
                report.updates.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::VideoStatus;

    use crate::testing::{generating_scene, Harness};

    #[tokio::test]
    async fn test_cycle_reconciles_without_a_client() {
        let h = Harness::new([generating_scene("s1", "abc", Utc::now())]);
        h.video.completes("abc", "https://cdn/s1.mp4");

        let mut jobs = JobConfig::default();
        jobs.background_poll = true;
        let background = BackgroundPoller::new(h.state.poller.clone(), &jobs);

        background.run_cycle().await.unwrap();
        assert_eq!(h.scene("s1").await.status, VideoStatus::Done);
    }

    #[tokio::test]
    async fn test_disabled_poller_returns_immediately() {
        let h = Harness::new([]);
        let mut jobs = JobConfig::default();
        jobs.background_poll = false;

        tokio::time::timeout(
            Duration::from_secs(1),
            BackgroundPoller::new(h.state.poller.clone(), &jobs).run(),
        )
        .await
        .unwrap();
    }
}
