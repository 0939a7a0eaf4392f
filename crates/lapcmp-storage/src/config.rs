//! Object store configuration.

use std::time::Duration;

use lapcmp_models::{JobId, OutputTarget};

use crate::error::{StorageError, StorageResult};

/// Default key prefix for everything the service writes.
pub const DEFAULT_PREFIX: &str = "lapcompare/";

/// Default lifetime of presigned URLs.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// Connection and layout settings for the S3-compatible object store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Key prefix, always ends with `/`
    pub prefix: String,
    pub presign_ttl: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            region: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket: String::new(),
            prefix: DEFAULT_PREFIX.to_string(),
            presign_ttl: DEFAULT_PRESIGN_TTL,
        }
    }
}

fn required(name: &str) -> StorageResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StorageError::config_error(format!("{} not set", name)))
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let prefix = std::env::var("B2_PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string());
        let presign_ttl = std::env::var("PRESIGN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PRESIGN_TTL);

        Ok(Self {
            endpoint_url: required("B2_S3_ENDPOINT")?,
            region: required("B2_REGION")?,
            access_key_id: required("B2_KEY_ID")?,
            secret_access_key: required("B2_APP_KEY")?,
            bucket: required("B2_BUCKET")?,
            prefix: normalize_prefix(&prefix),
            presign_ttl,
        })
    }

    /// Where the artifacts of `job_id` are published.
    pub fn results_target(&self, job_id: &JobId) -> OutputTarget {
        OutputTarget::new(
            &self.bucket,
            format!("{}results/{}/", self.prefix, job_id),
        )
    }

    /// Key for a fresh client upload of `filename`.
    pub fn upload_key(&self, upload_id: &str, filename: &str) -> String {
        format!(
            "{}uploads/{}_{}",
            self.prefix,
            upload_id,
            sanitize_filename(filename)
        )
    }
}

/// Ensure a non-empty prefix ends with a single `/`.
fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

/// Keep only the last path component so a client cannot steer the key
/// outside `uploads/`.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match name {
        "" | "." | ".." => "upload".to_string(),
        other => other.to_string(),
    }
}
