//! Worker error types.

use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] lapcmp_storage::StorageError),

    #[error("{0}")]
    Media(#[from] lapcmp_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] lapcmp_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Only infrastructure hiccups are worth another attempt; analysis
    /// failures repeat deterministically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Storage(_) | WorkerError::Queue(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapcmp_media::MediaError;

    #[test]
    fn test_engine_failures_not_retryable() {
        let err = WorkerError::from(MediaError::insufficient_motion("empty motion proxy"));
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("Insufficient motion data"));
        assert!(!WorkerError::Timeout(Duration::from_secs(5)).is_retryable());
    }

    #[test]
    fn test_storage_failures_retryable() {
        let err = WorkerError::from(lapcmp_storage::StorageError::download_failed("reset"));
        assert!(err.is_retryable());
    }
}
