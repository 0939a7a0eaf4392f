//! Job lifecycle status for polling.
//!
//! A `JobRecord` is what the dispatch layer persists per submitted run;
//! `RunState` is the runner-facing view of it and `JobStatusView` is the
//! shape returned to API clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;

/// Externally visible job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued or being processed
    #[default]
    Running,
    /// Completed with a manifest
    Finished,
    /// Cancelled before completion
    Cancelled,
    /// Failed with an error
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a submitted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Succeeded(Manifest),
    Cancelled,
    Failed(String),
}

impl RunState {
    pub fn status(&self) -> JobStatus {
        match self {
            RunState::Pending => JobStatus::Running,
            RunState::Succeeded(_) => JobStatus::Finished,
            RunState::Cancelled => JobStatus::Cancelled,
            RunState::Failed(_) => JobStatus::Failed,
        }
    }
}

/// Polling response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<RunState> for JobStatusView {
    fn from(state: RunState) -> Self {
        let status = state.status();
        let (result, error) = match state {
            RunState::Succeeded(manifest) => (Some(manifest), None),
            RunState::Failed(msg) => (None, Some(msg)),
            RunState::Pending | RunState::Cancelled => (None, None),
        };
        Self {
            status,
            result,
            error,
        }
    }
}

/// Persisted record for one submitted run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Dispatch handle returned to the client
    pub call_id: String,
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(call_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.into(),
            job_id: job_id.into(),
            status: JobStatus::Running,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark job as finished with its manifest.
    pub fn finish(&mut self, manifest: Manifest) {
        self.status = JobStatus::Finished;
        self.result = Some(manifest);
        self.error = None;
        self.updated_at = Utc::now();
    }

    /// Mark job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.updated_at = Utc::now();
    }

    pub fn run_state(&self) -> RunState {
        match self.status {
            JobStatus::Running => RunState::Pending,
            JobStatus::Finished => match &self.result {
                Some(manifest) => RunState::Succeeded(manifest.clone()),
                None => RunState::Failed("finished without a result".to_string()),
            },
            JobStatus::Cancelled => RunState::Cancelled,
            JobStatus::Failed => RunState::Failed(
                self.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            ),
        }
    }
}
