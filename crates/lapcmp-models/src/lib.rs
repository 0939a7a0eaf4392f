//! Shared data models for the LapCompare backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job payloads (pair and segments mode) and object locators
//! - Result manifests and artifact references
//! - Job status records used for polling

pub mod error;
pub mod job;
pub mod job_status;
pub mod manifest;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{AnalysisRequest, JobId, JobMode, ObjectLocator, OutputTarget, SegmentRange};
pub use job_status::{JobRecord, JobStatus, JobStatusView, RunState};
pub use manifest::{
    ArtifactRef, Insights, Manifest, SignedUpload, ANALYSIS_SUMMARY, INSIGHTS_FILE,
    MANIFEST_FILE, METRICS_FILE, OVERLAY_FILE,
};
