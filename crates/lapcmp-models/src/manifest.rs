//! Result manifest and artifact records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rendered side-by-side overlay video.
pub const OVERLAY_FILE: &str = "overlay.mp4";
/// Distance / time-offset samples.
pub const METRICS_FILE: &str = "metrics.csv";
/// Descriptive record of the run.
pub const INSIGHTS_FILE: &str = "insights.json";
/// Manifest object written next to the artifacts.
pub const MANIFEST_FILE: &str = "manifest.json";

pub const ANALYSIS_SUMMARY: &str = "Analysis complete";

/// A published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub bucket: String,
    pub key: String,
    /// Time-limited download URL
    pub url: String,
}

/// Result manifest for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub job_id: String,
    pub summary: String,
    /// Artifacts keyed by file name
    pub artifacts: BTreeMap<String, ArtifactRef>,
    /// Key of the stored manifest object; set once the manifest itself is uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_key: Option<String>,
}

impl Manifest {
    pub fn new(job_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            summary: summary.into(),
            artifacts: BTreeMap::new(),
            manifest_key: None,
        }
    }

    pub fn artifact(&self, name: &str) -> Option<&ArtifactRef> {
        self.artifacts.get(name)
    }
}

/// The `insights.json` record written by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    pub summary: String,
    pub overlay: String,
    pub metrics: String,
    pub insights: String,
}

impl Default for Insights {
    fn default() -> Self {
        Self {
            summary: ANALYSIS_SUMMARY.to_string(),
            overlay: OVERLAY_FILE.to_string(),
            metrics: METRICS_FILE.to_string(),
            insights: INSIGHTS_FILE.to_string(),
        }
    }
}

/// Pre-signed upload slot handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUpload {
    pub bucket: String,
    pub key: String,
    pub put_url: String,
    pub get_url: String,
}
