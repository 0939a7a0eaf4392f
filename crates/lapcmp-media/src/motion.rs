//! Motion proxy extraction.
//!
//! Each consecutive frame pair yields one step: a speed (median flow
//! magnitude) and a yaw proxy (`sin(atan2(median_dy, median_dx))`). The steps
//! are smoothed, integrated into a cumulative distance axis and resampled onto
//! evenly spaced distances, so two recordings of the same path line up by
//! "how far along" rather than by wall-clock time.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{ensure_active, MediaResult};
use crate::flow::FlowEstimator;
use crate::frame::{to_gray, FrameSequence};
use crate::signal::{cumsum, interp, linspace, moving_average_same};

/// Arc-length parameterised (speed, yaw) signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionProxySignal {
    /// Cumulative distance, non-decreasing
    pub s: Vec<f64>,
    /// Speed proxy
    pub v: Vec<f64>,
    /// Yaw proxy in [-1, 1]
    pub y: Vec<f64>,
}

impl MotionProxySignal {
    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }
}

/// Resampling and smoothing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxySettings {
    pub smoothing_window: usize,
    pub max_samples: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            smoothing_window: 9,
            max_samples: 4000,
        }
    }
}

impl From<&EngineConfig> for ProxySettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            smoothing_window: cfg.smoothing_window,
            max_samples: cfg.max_samples,
        }
    }
}

/// Per-step (speed, yaw) from consecutive frames.
pub fn motion_steps(
    frames: &FrameSequence,
    estimator: &dyn FlowEstimator,
    cancel: &CancellationToken,
) -> MediaResult<(Vec<f64>, Vec<f64>)> {
    let steps = frames.len().saturating_sub(1);
    let mut speeds = Vec::with_capacity(steps);
    let mut yaws = Vec::with_capacity(steps);

    let mut iter = frames.frames.iter();
    let Some(first) = iter.next() else {
        return Ok((speeds, yaws));
    };
    let mut prev = to_gray(first);

    for frame in iter {
        ensure_active(cancel)?;
        let gray = to_gray(frame);
        let flow = estimator.estimate(&prev, &gray)?;
        speeds.push(flow.median_magnitude());
        yaws.push(flow.median_dy().atan2(flow.median_dx()).sin());
        prev = gray;
    }

    Ok((speeds, yaws))
}

/// Build the resampled signal from per-step speeds and yaws.
///
/// Returns an empty signal when there are no steps.
pub fn proxy_from_steps(
    speeds: &[f64],
    yaws: &[f64],
    fps: f64,
    settings: ProxySettings,
) -> MotionProxySignal {
    let window = settings.smoothing_window;
    let (speeds, yaws) = if window > 0 && speeds.len() > window {
        (
            moving_average_same(speeds, window),
            moving_average_same(yaws, window),
        )
    } else {
        (speeds.to_vec(), yaws.to_vec())
    };

    let dt = 1.0 / fps.max(1.0);
    let dist = cumsum(speeds.iter().map(|v| v * dt));
    let Some(&total) = dist.last() else {
        return MotionProxySignal::default();
    };

    let n = dist.len().min(settings.max_samples.max(1));
    let s = linspace(0.0, total, n);
    let v = interp(&s, &dist, &speeds);
    let y = interp(&s, &dist, &yaws);

    MotionProxySignal { s, v, y }
}

/// Full extraction for one stabilized sequence.
///
/// Distances are integrated at `fps`, the rate shared by both recordings of a
/// comparison, not the sequence's own rate.
pub fn extract_motion_proxy(
    frames: &FrameSequence,
    estimator: &dyn FlowEstimator,
    fps: f64,
    settings: ProxySettings,
    cancel: &CancellationToken,
) -> MediaResult<MotionProxySignal> {
    let (speeds, yaws) = motion_steps(frames, estimator, cancel)?;
    let signal = proxy_from_steps(&speeds, &yaws, fps, settings);

    info!(
        steps = speeds.len(),
        samples = signal.len(),
        distance = signal.s.last().copied().unwrap_or(0.0),
        "Extracted motion proxy"
    );

    Ok(signal)
}
