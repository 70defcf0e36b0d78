//! Client side of the scene video lifecycle.
//!
//! This crate provides:
//! - `FunctionsClient`: HTTP calls to the API server
//! - `SceneCache`: the local copy of a project's scenes with snapshot/rollback
//! - `PollingMachine`: idle/polling state driven by outstanding jobs
//! - `SceneReconciler`: merges user mutations, realtime events and fallback polls

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod polling;
pub mod reconciler;

pub use backend::{CancelResponse, GenerateRequest, GenerateResponse, PollResponse, SceneBackend};
pub use cache::{SceneCache, Snapshot};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::FunctionsClient;
pub use polling::{PollingMachine, PollingState, Transition};
pub use reconciler::{SceneNotice, SceneReconciler, SubmitOutcome};
