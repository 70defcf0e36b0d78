//! Poll cycle results and realtime change events.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, SceneId};
use crate::scene::{SceneJob, VideoStatus};

/// One scene whose state changed during a poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneUpdate {
    pub scene_id: SceneId,
    /// Status reported to the caller. Timed-out jobs report `failed`.
    pub status: VideoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// True for a forced reset of a stuck job (record is pending again).
    #[serde(default)]
    pub timed_out: bool,
}

impl SceneUpdate {
    pub fn completed(scene_id: SceneId, result_url: impl Into<String>) -> Self {
        Self {
            scene_id,
            status: VideoStatus::Done,
            result_url: Some(result_url.into()),
            error_text: None,
            timed_out: false,
        }
    }

    pub fn failed(scene_id: SceneId, error_text: impl Into<String>) -> Self {
        Self {
            scene_id,
            status: VideoStatus::Failed,
            result_url: None,
            error_text: Some(error_text.into()),
            timed_out: false,
        }
    }

    pub fn timed_out(scene_id: SceneId, error_text: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::failed(scene_id, error_text)
        }
    }
}

/// Kind of row change carried by the realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Realtime notification for a scene row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeEvent {
    pub project_id: ProjectId,
    pub scene_id: SceneId,
    pub kind: ChangeKind,
    /// New row contents (absent for deletes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<SceneJob>,
    pub emitted_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn updated(record: SceneJob) -> Self {
        Self {
            project_id: record.project_id.clone(),
            scene_id: record.id.clone(),
            kind: ChangeKind::Update,
            record: Some(record),
            emitted_at: Utc::now(),
        }
    }

    pub fn inserted(record: SceneJob) -> Self {
        Self {
            kind: ChangeKind::Insert,
            ..Self::updated(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_out_update_reports_failed() {
        let u = SceneUpdate::timed_out(SceneId::from("s1"), "late");
        assert_eq!(u.status, VideoStatus::Failed);
        assert!(u.timed_out);
        assert!(u.result_url.is_none());
    }

    #[test]
    fn test_change_event_json_shape() {
        let record = SceneJob::new(SceneId::from("s1"), ProjectId::from("p1"));
        let event = ChangeEvent::updated(record);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "update");
        assert_eq!(json["project_id"], "p1");
        assert_eq!(json["record"]["status"], "pending");
    }
}
