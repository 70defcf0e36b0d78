//! Scene video job record and its state transitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ProjectId, SceneId};

/// Error text written when a stuck job is force-reset.
pub const TIMEOUT_ERROR_TEXT: &str = "Generation timed out — please retry";

/// Video generation status of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// No job outstanding; ready to submit
    #[default]
    Pending,
    /// A job is running upstream
    Generating,
    /// A clip has been produced
    Done,
    /// The last job failed
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Generating => "generating",
            VideoStatus::Done => "done",
            VideoStatus::Failed => "failed",
        }
    }

    /// Statuses from which a new submission may start.
    pub const SUBMITTABLE: [VideoStatus; 3] =
        [VideoStatus::Pending, VideoStatus::Failed, VideoStatus::Done];
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unknown status string.
#[derive(Debug, Error)]
#[error("Unknown video status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for VideoStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VideoStatus::Pending),
            "generating" => Ok(VideoStatus::Generating),
            "done" => Ok(VideoStatus::Done),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Storyboard framing of a scene. Drives the camera-movement clause of the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    Wide,
    #[default]
    Medium,
    CloseUp,
    ExtremeCloseUp,
    #[serde(alias = "establishing_shot")]
    Establishing,
    OverTheShoulder,
    Aerial,
}

impl ShotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::Wide => "wide",
            ShotType::Medium => "medium",
            ShotType::CloseUp => "close_up",
            ShotType::ExtremeCloseUp => "extreme_close_up",
            ShotType::Establishing => "establishing",
            ShotType::OverTheShoulder => "over_the_shoulder",
            ShotType::Aerial => "aerial",
        }
    }

    /// Lenient parse used for free-form storyboard values ("Close-up", "WIDE SHOT").
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .replace(['-', ' '], "_")
            .trim_end_matches("_shot")
            .to_string();

        match normalized.as_str() {
            "wide" | "long" | "full" => Some(ShotType::Wide),
            "medium" | "mid" => Some(ShotType::Medium),
            "close_up" | "closeup" | "close" => Some(ShotType::CloseUp),
            "extreme_close_up" | "extreme_closeup" => Some(ShotType::ExtremeCloseUp),
            "establishing" => Some(ShotType::Establishing),
            "over_the_shoulder" | "ots" => Some(ShotType::OverTheShoulder),
            "aerial" | "drone" | "birds_eye" => Some(ShotType::Aerial),
            _ => None,
        }
    }
}

/// The slice of a scene row that the video job lifecycle reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneJob {
    /// Primary key
    pub id: SceneId,
    /// Owning project
    pub project_id: ProjectId,
    /// Video generation status
    #[serde(default)]
    pub status: VideoStatus,
    /// Upstream job/request id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Output clip URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    /// Last error shown to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// Time of the last status transition
    pub status_updated_at: DateTime<Utc>,
    /// Still image the clip is animated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image_url: Option<String>,
    /// Motion description written for the scene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
    /// Storyboard framing
    #[serde(default)]
    pub shot_type: ShotType,
}

impl SceneJob {
    /// A freshly created storyboard scene.
    pub fn new(id: SceneId, project_id: ProjectId) -> Self {
        Self {
            id,
            project_id,
            status: VideoStatus::Pending,
            job_id: None,
            result_url: None,
            error_text: None,
            status_updated_at: Utc::now(),
            source_image_url: None,
            prompt_text: None,
            shot_type: ShotType::default(),
        }
    }

    pub fn with_inputs(
        mut self,
        source_image_url: impl Into<String>,
        prompt_text: impl Into<String>,
        shot_type: ShotType,
    ) -> Self {
        self.source_image_url = Some(source_image_url.into());
        self.prompt_text = Some(prompt_text.into());
        self.shot_type = shot_type;
        self
    }

    /// True if the job is outstanding upstream.
    pub fn is_generating(&self) -> bool {
        self.status == VideoStatus::Generating
    }

    /// Time spent in the current status.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.status_updated_at
    }

    /// Apply a patch, stamping `status_updated_at` when the status is written.
    pub fn apply(&mut self, patch: &ScenePatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
            self.status_updated_at = now;
        }
        if let Some(job_id) = &patch.job_id {
            self.job_id = job_id.clone();
        }
        if let Some(result_url) = &patch.result_url {
            self.result_url = result_url.clone();
        }
        if let Some(error_text) = &patch.error_text {
            self.error_text = error_text.clone();
        }
    }

    /// Check the record invariants.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        match self.status {
            VideoStatus::Generating if self.job_id.is_none() => {
                Err(InvariantViolation::GeneratingWithoutJob(self.id.clone()))
            }
            VideoStatus::Done if self.result_url.is_none() => {
                Err(InvariantViolation::DoneWithoutResult(self.id.clone()))
            }
            VideoStatus::Pending if self.job_id.is_some() || self.result_url.is_some() => {
                Err(InvariantViolation::DirtyPending(self.id.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// A broken record invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("Scene {0} is generating without a job id")]
    GeneratingWithoutJob(SceneId),

    #[error("Scene {0} is done without a result url")]
    DoneWithoutResult(SceneId),

    #[error("Scene {0} is pending but still carries job state")]
    DirtyPending(SceneId),
}

/// Partial update of a scene's job fields.
///
/// The outer `Option` is "leave untouched"; the inner one is the new nullable value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<Option<String>>,
}

impl ScenePatch {
    /// Job accepted upstream.
    pub fn generating(job_id: impl Into<String>) -> Self {
        Self {
            status: Some(VideoStatus::Generating),
            job_id: Some(Some(job_id.into())),
            result_url: Some(None),
            error_text: Some(None),
        }
    }

    /// Job completed. The job id is kept for audit.
    pub fn done(result_url: impl Into<String>) -> Self {
        Self {
            status: Some(VideoStatus::Done),
            job_id: None,
            result_url: Some(Some(result_url.into())),
            error_text: Some(None),
        }
    }

    /// Job or submission failed.
    pub fn failed(error_text: impl Into<String>) -> Self {
        Self {
            status: Some(VideoStatus::Failed),
            job_id: None,
            result_url: None,
            error_text: Some(Some(error_text.into())),
        }
    }

    /// Clean, retryable state.
    pub fn reset() -> Self {
        Self {
            status: Some(VideoStatus::Pending),
            job_id: Some(None),
            result_url: Some(None),
            error_text: Some(None),
        }
    }

    /// Forced reset of a stuck job.
    pub fn timed_out() -> Self {
        Self {
            error_text: Some(Some(TIMEOUT_ERROR_TEXT.to_string())),
            ..Self::reset()
        }
    }

    /// Names of the record fields this patch writes, including the status stamp.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::with_capacity(5);
        if self.status.is_some() {
            paths.push("status");
            paths.push("status_updated_at");
        }
        if self.job_id.is_some() {
            paths.push("job_id");
        }
        if self.result_url.is_some() {
            paths.push("result_url");
        }
        if self.error_text.is_some() {
            paths.push("error_text");
        }
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.field_paths().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scene() -> SceneJob {
        SceneJob::new(SceneId::from("s1"), ProjectId::from("p1"))
    }

    #[test]
    fn test_new_scene_is_pending_and_valid() {
        let s = scene();
        assert_eq!(s.status, VideoStatus::Pending);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_lifecycle_keeps_invariants() {
        let mut s = scene();
        let t0 = Utc::now();

        s.apply(&ScenePatch::generating("abc"), t0);
        assert_eq!(s.status, VideoStatus::Generating);
        assert_eq!(s.job_id.as_deref(), Some("abc"));
        assert!(s.check_invariants().is_ok());

        let t1 = t0 + Duration::seconds(30);
        s.apply(&ScenePatch::done("https://cdn/clip.mp4"), t1);
        assert_eq!(s.status, VideoStatus::Done);
        assert_eq!(s.job_id.as_deref(), Some("abc"));
        assert_eq!(s.status_updated_at, t1);
        assert!(s.check_invariants().is_ok());

        s.apply(&ScenePatch::reset(), t1);
        assert!(s.job_id.is_none());
        assert!(s.result_url.is_none());
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_failed_keeps_result_url_null() {
        let mut s = scene();
        s.apply(&ScenePatch::generating("abc"), Utc::now());
        s.apply(&ScenePatch::failed("upstream exploded"), Utc::now());
        assert_eq!(s.status, VideoStatus::Failed);
        assert!(s.result_url.is_none());
        assert_eq!(s.error_text.as_deref(), Some("upstream exploded"));
    }

    #[test]
    fn test_timed_out_resets_with_message() {
        let mut s = scene();
        s.apply(&ScenePatch::generating("abc"), Utc::now());
        s.apply(&ScenePatch::timed_out(), Utc::now());
        assert_eq!(s.status, VideoStatus::Pending);
        assert!(s.job_id.is_none());
        assert_eq!(s.error_text.as_deref(), Some(TIMEOUT_ERROR_TEXT));
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_invariant_violations_detected() {
        let mut s = scene();
        s.status = VideoStatus::Generating;
        assert!(matches!(
            s.check_invariants(),
            Err(InvariantViolation::GeneratingWithoutJob(_))
        ));

        s.status = VideoStatus::Done;
        assert!(matches!(
            s.check_invariants(),
            Err(InvariantViolation::DoneWithoutResult(_))
        ));
    }

    #[test]
    fn test_patch_without_status_keeps_timestamp() {
        let mut s = scene();
        let stamp = s.status_updated_at;
        let patch = ScenePatch {
            error_text: Some(Some("note".into())),
            ..Default::default()
        };
        s.apply(&patch, stamp + Duration::minutes(3));
        assert_eq!(s.status_updated_at, stamp);
    }

    #[test]
    fn test_field_paths_include_status_stamp() {
        let paths = ScenePatch::done("u").field_paths();
        assert!(paths.contains(&"status"));
        assert!(paths.contains(&"status_updated_at"));
        assert!(paths.contains(&"result_url"));
        assert!(!paths.contains(&"job_id"));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            VideoStatus::Pending,
            VideoStatus::Generating,
            VideoStatus::Done,
            VideoStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<VideoStatus>().unwrap(), status);
        }
        assert!("queued".parse::<VideoStatus>().is_err());
    }

    #[test]
    fn test_shot_type_lenient_parse() {
        assert_eq!(ShotType::parse_lenient("Close-up"), Some(ShotType::CloseUp));
        assert_eq!(ShotType::parse_lenient("WIDE SHOT"), Some(ShotType::Wide));
        assert_eq!(ShotType::parse_lenient("Extreme close up"), Some(ShotType::ExtremeCloseUp));
        assert_eq!(ShotType::parse_lenient("dutch angle"), None);
    }
}
