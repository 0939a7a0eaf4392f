//! Job dispatch for LapCompare.
//!
//! This crate provides:
//! - The [`JobRunner`] seam used by the control plane
//! - A Redis Streams runner with per-call status records and a DLQ
//! - An in-process runner for single-binary deployments and tests

pub mod error;
pub mod job;
pub mod local;
pub mod queue;
pub mod redis_runner;
pub mod runner;
pub mod status;

pub use error::{QueueError, QueueResult};
pub use job::{AnalysisJob, QueuedJob};
pub use local::LocalJobRunner;
pub use queue::{JobQueue, QueueConfig};
pub use redis_runner::RedisJobRunner;
pub use runner::{JobHandler, JobRunner, RunHandle};
pub use status::{status_key, StatusStore};
