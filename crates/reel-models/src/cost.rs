//! Cost ledger entries.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, SceneId};

/// One billable operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostEntry {
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<SceneId>,
    /// Billing service name (e.g. "fal")
    pub service: String,
    /// Operation label (e.g. "image_to_video")
    pub operation: String,
    /// Amount in USD
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

impl CostEntry {
    pub fn new(
        project_id: ProjectId,
        service: impl Into<String>,
        operation: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            project_id,
            scene_id: None,
            service: service.into(),
            operation: operation.into(),
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn for_scene(mut self, scene_id: SceneId) -> Self {
        self.scene_id = Some(scene_id);
        self
    }
}
