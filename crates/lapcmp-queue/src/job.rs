//! Dispatched job payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lapcmp_models::{AnalysisRequest, JobId, JobMode, OutputTarget};

/// One analysis run as handed to a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub job_id: JobId,
    pub request: AnalysisRequest,
    /// Where the worker publishes artifacts
    pub outputs: OutputTarget,
    pub created_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(job_id: JobId, request: AnalysisRequest, outputs: OutputTarget) -> Self {
        Self {
            job_id,
            request,
            outputs,
            created_at: Utc::now(),
        }
    }

    pub fn mode(&self) -> JobMode {
        self.request.mode()
    }
}

/// Stream entry: the job plus the call id its status is tracked under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub call_id: String,
    pub job: AnalysisJob,
}
