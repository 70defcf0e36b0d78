//! Shared data models for the LyricReel scene video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Scene and project identifiers
//! - The scene video job record and its patches
//! - Poll cycle updates and realtime change events
//! - Cost ledger entries

pub mod cost;
pub mod ids;
pub mod scene;
pub mod update;

// Re-export common types
pub use cost::CostEntry;
pub use ids::{ProjectId, SceneId};
pub use scene::{
    InvariantViolation, ParseStatusError, SceneJob, ScenePatch, ShotType, VideoStatus,
    TIMEOUT_ERROR_TEXT,
};
pub use update::{ChangeEvent, ChangeKind, SceneUpdate};
