//! Client for a queue-style image-to-video generation API.
//!
//! Jobs are submitted for a request id and then observed through status and
//! result endpoints. Each call carries its own deadline so handlers never hang
//! on the upstream service.

pub mod client;
pub mod error;
pub mod metrics;
pub mod types;

pub use client::{QueueVideoClient, VideoApi, VideoClientConfig};
pub use error::{VideoApiError, VideoApiResult};
pub use types::{UpstreamStatus, VideoOutput, VideoRequest};
