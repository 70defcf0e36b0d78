//! Realtime scene change feed.
//!
//! Handlers publish a [`ChangeEvent`] after every committed write; clients
//! subscribe per project. Delivery is best effort: a dropped event is
//! eventually covered by the client's polling fallback.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use reel_models::{ChangeEvent, ProjectId};

use crate::error::QueueResult;

pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn publish(&self, event: &ChangeEvent) -> QueueResult<()>;

    /// Events for one project, in publish order.
    async fn subscribe(&self, project_id: &ProjectId) -> QueueResult<ChangeStream>;
}

/// Change feed over Redis Pub/Sub.
pub struct RedisChangeFeed {
    client: redis::Client,
}

impl RedisChangeFeed {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Channel name for a project.
    pub fn channel_name(project_id: &ProjectId) -> String {
        format!("scenes:{}", project_id)
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn publish(&self, event: &ChangeEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.project_id);
        let payload = serde_json::to_string(event)?;

        debug!(scene_id = %event.scene_id, "Publishing scene change to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    async fn subscribe(&self, project_id: &ProjectId) -> QueueResult<ChangeStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(project_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            match serde_json::from_str(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Dropping malformed scene change payload: {}", e);
                    None
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

/// In-process change feed on a broadcast channel.
pub struct LocalChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for LocalChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl LocalChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn publish(&self, event: &ChangeEvent) -> QueueResult<()> {
        // No subscribers is not an error.
        let _ = self.tx.send(event.clone());
        Ok(())
    }

    async fn subscribe(&self, project_id: &ProjectId) -> QueueResult<ChangeStream> {
        let rx = self.tx.subscribe();
        let project_id = project_id.clone();

        let stream = futures_util::stream::unfold(rx, move |mut rx| {
            let project_id = project_id.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) if event.project_id == project_id => return Some((event, rx)),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Scene change subscriber lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
