//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("mode must be 'pair' or 'segments'")]
    InvalidMode(String),

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        Self::InvalidMode(mode.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Validation errors are the caller's fault and map to client errors.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidMode(_) | Self::InvalidPayload(_))
    }
}
