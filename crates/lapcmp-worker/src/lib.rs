//! Analysis worker.
//!
//! This crate provides:
//! - The queue executor with bounded concurrency and graceful shutdown
//! - The per-job processor (download, engine, publish)
//! - Structured job logging

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod processor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::{init_tracing, JobLogger};
pub use processor::{input_plan, run_analysis, AnalysisProcessor};
