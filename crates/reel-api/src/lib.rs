//! Axum HTTP API server for the scene video job lifecycle.
//!
//! This crate provides:
//! - Submission, status polling and cancellation handlers under `/functions`
//! - Scene reads used by the client reconciler
//! - A background poll loop for jobs nobody is watching
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::{ApiConfig, JobConfig, StoreBackend};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{BackgroundPoller, JobCancellationService, JobStatusPoller, JobSubmissionService};
pub use state::AppState;
