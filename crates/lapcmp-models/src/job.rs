//! Job payload definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};

/// Unique identifier for an analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location of an object in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Where a job's artifacts are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub bucket: String,
    /// Key prefix, ends with `/`
    pub prefix: String,
}

impl OutputTarget {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Object key for `name` under this target.
    pub fn key_for(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

/// A time range inside a source video, in seconds.
///
/// An `end` of zero (or anything not after zero) means "to the end of the source".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentRange {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

impl SegmentRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// The end timestamp, or `None` when the range runs to the end of the source.
    pub fn end_bound(&self) -> Option<f64> {
        (self.end > 0.0).then_some(self.end)
    }
}

/// Analysis mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Two separate recordings
    Pair,
    /// Two ranges cut from one recording
    Segments,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Pair => "pair",
            JobMode::Segments => "segments",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pair" => Ok(JobMode::Pair),
            "segments" => Ok(JobMode::Segments),
            other => Err(ModelError::invalid_mode(other)),
        }
    }
}

/// Job payload accepted by the control plane and executed by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnalysisRequest {
    Pair {
        #[serde(rename = "lapA")]
        lap_a: ObjectLocator,
        #[serde(rename = "lapB")]
        lap_b: ObjectLocator,
    },
    Segments {
        video: ObjectLocator,
        #[serde(rename = "segA", default)]
        seg_a: SegmentRange,
        #[serde(rename = "segB", default)]
        seg_b: SegmentRange,
    },
}

impl AnalysisRequest {
    /// Parse an untyped payload.
    ///
    /// The mode is validated first so an unknown mode is always reported as
    /// such, whatever else is wrong with the payload.
    pub fn from_value(value: serde_json::Value) -> ModelResult<Self> {
        let mode = value
            .get("mode")
            .and_then(|m| m.as_str())
            .ok_or_else(|| ModelError::invalid_mode(""))?;
        mode.parse::<JobMode>()?;

        serde_json::from_value(value).map_err(|e| ModelError::invalid_payload(e.to_string()))
    }

    pub fn mode(&self) -> JobMode {
        match self {
            AnalysisRequest::Pair { .. } => JobMode::Pair,
            AnalysisRequest::Segments { .. } => JobMode::Segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pair_request() {
        let req = AnalysisRequest::from_value(json!({
            "mode": "pair",
            "lapA": {"bucket": "b", "key": "uploads/a.mp4"},
            "lapB": {"bucket": "b", "key": "uploads/b.mp4"}
        }))
        .unwrap();

        assert_eq!(req.mode(), JobMode::Pair);
        match req {
            AnalysisRequest::Pair { lap_a, lap_b } => {
                assert_eq!(lap_a.key, "uploads/a.mp4");
                assert_eq!(lap_b.key, "uploads/b.mp4");
            }
            _ => panic!("expected pair request"),
        }
    }

    #[test]
    fn test_parse_segments_request_defaults() {
        let req = AnalysisRequest::from_value(json!({
            "mode": "segments",
            "video": {"bucket": "b", "key": "uploads/v.mp4"},
            "segA": {"start": 1.5},
            "segB": {"start": 10, "end": 20}
        }))
        .unwrap();

        match req {
            AnalysisRequest::Segments { seg_a, seg_b, .. } => {
                assert_eq!(seg_a.start, 1.5);
                assert_eq!(seg_a.end_bound(), None);
                assert_eq!(seg_b.end_bound(), Some(20.0));
            }
            _ => panic!("expected segments request"),
        }
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = AnalysisRequest::from_value(json!({
            "mode": "unknown",
            "lapA": {"bucket": "b", "key": "a"}
        }))
        .unwrap_err();

        assert!(matches!(err, ModelError::InvalidMode(ref m) if m == "unknown"));
        assert_eq!(err.to_string(), "mode must be 'pair' or 'segments'");
    }

    #[test]
    fn test_missing_mode_rejected() {
        let err = AnalysisRequest::from_value(json!({"video": {"bucket": "b", "key": "v"}}))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidMode(_)));
    }

    #[test]
    fn test_missing_locator_is_payload_error() {
        let err = AnalysisRequest::from_value(json!({"mode": "pair"})).unwrap_err();
        assert!(matches!(err, ModelError::InvalidPayload(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn test_pair_serializes_with_wire_names() {
        let req = AnalysisRequest::Pair {
            lap_a: ObjectLocator::new("b", "a.mp4"),
            lap_b: ObjectLocator::new("b", "b.mp4"),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["mode"], "pair");
        assert_eq!(value["lapA"]["key"], "a.mp4");
    }

    #[test]
    fn test_output_target_keys() {
        let target = OutputTarget::new("b", "lapcompare/results/j1/");
        assert_eq!(target.key_for("overlay.mp4"), "lapcompare/results/j1/overlay.mp4");
    }

    #[test]
    fn test_negative_end_is_unbounded() {
        assert_eq!(SegmentRange::new(3.0, -1.0).end_bound(), None);
    }
}
