//! Scene record store.
//!
//! This crate provides:
//! - `SceneStore` and `CostLedger` seams used by the job handlers
//! - Firestore REST repositories with compare-and-swap status writes
//! - An in-process store for local development and tests
//! - Service account authentication via gcp_auth, token caching and retry

pub mod client;
pub mod cost_repo;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod scene_repo;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use cost_repo::FirestoreCostLedger;
pub use error::{FirestoreError, FirestoreResult};
pub use memory::{InMemoryCostLedger, InMemorySceneStore};
pub use retry::RetryConfig;
pub use scene_repo::FirestoreSceneStore;
pub use store::{is_generating_job, CostLedger, SceneStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
