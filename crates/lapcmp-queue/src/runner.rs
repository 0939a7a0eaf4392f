//! Dispatch seam between the control plane and whatever executes jobs.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lapcmp_models::{Manifest, RunState};

use crate::error::QueueResult;
use crate::job::AnalysisJob;

/// Opaque handle for a submitted run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    pub call_id: String,
}

impl RunHandle {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
        }
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.call_id)
    }
}

/// Submits jobs and reports on them.
///
/// `poll` returns `QueueError::JobNotFound` for handles it has never issued.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn submit(&self, job: AnalysisJob) -> QueueResult<RunHandle>;

    async fn poll(&self, handle: &RunHandle) -> QueueResult<RunState>;

    /// Cancel a run. Cancelling a finished run has no effect.
    async fn cancel(&self, handle: &RunHandle) -> QueueResult<()>;
}

/// Executes one job to completion.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Error: fmt::Display + Send;

    async fn handle(&self, job: &AnalysisJob) -> Result<Manifest, Self::Error>;
}
