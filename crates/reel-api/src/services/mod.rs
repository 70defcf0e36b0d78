//! Job lifecycle services.

pub mod background_poller;
pub mod cancellation;
pub mod poller;
pub mod prompt;
pub mod submission;

pub use background_poller::BackgroundPoller;
pub use cancellation::{CancelOutcome, JobCancellationService};
pub use poller::{JobStatusPoller, PollReport, PollerConfig};
pub use prompt::compose_prompt;
pub use submission::{JobSubmissionService, SubmitOutcome, SubmitRequest};

use reel_models::{ChangeEvent, SceneJob};
use reel_queue::ChangeFeed;
use tracing::warn;

/// Announce a committed write. Feed failures only log; clients fall back to polling.
pub(crate) async fn publish_change(feed: &dyn ChangeFeed, record: SceneJob) {
    let scene_id = record.id.clone();
    if let Err(e) = feed.publish(&ChangeEvent::updated(record)).await {
        warn!(scene_id = %scene_id, "Failed to publish scene change: {}", e);
    }
}
