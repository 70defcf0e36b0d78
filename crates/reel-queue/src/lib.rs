//! Request serialization and realtime change delivery.
//!
//! This crate provides:
//! - `SerialQueue`: a single-lane async task runner with an inter-task delay
//! - `ChangeFeed`: scene change events via Redis Pub/Sub, or in-process

pub mod error;
pub mod feed;
pub mod serial;

pub use error::{QueueError, QueueResult};
pub use feed::{ChangeFeed, ChangeStream, LocalChangeFeed, RedisChangeFeed};
pub use serial::{SerialQueue, DEFAULT_TASK_DELAY};
