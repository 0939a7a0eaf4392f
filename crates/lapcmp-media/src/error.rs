//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during analysis.
///
/// Every variant is fatal for the run that produced it.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Insufficient motion data: {0}")]
    InsufficientMotion(String),

    #[error("Failed to decode video {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Segment extraction failed for {path}: {message}")]
    SegmentExtraction {
        path: PathBuf,
        message: String,
        stderr: Option<String>,
    },

    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an insufficient motion error.
    pub fn insufficient_motion(message: impl Into<String>) -> Self {
        Self::InsufficientMotion(message.into())
    }

    /// Create a decode error for `path`.
    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Bail out of a long-running loop once `cancel` fires.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> MediaResult<()> {
    if cancel.is_cancelled() {
        Err(MediaError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for MediaError {
    fn from(err: opencv::Error) -> Self {
        Self::Internal(format!("OpenCV: {}", err))
    }
}
