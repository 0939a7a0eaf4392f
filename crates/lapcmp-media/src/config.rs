//! Engine configuration.

use std::str::FromStr;

/// Tunables for one analysis run. Built once per process and passed down.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Frame rate assumed when neither input reports one
    pub default_fps: f64,
    /// Optical flow runs on a copy no wider than this (None = full resolution)
    pub flow_max_width: Option<u32>,
    /// Search radius around the projected coarse path
    pub dtw_radius: usize,
    /// Largest cost matrix solved exactly
    pub dtw_exact_cells: usize,
    /// Upper bound on arc-length samples per signal
    pub max_samples: usize,
    /// Moving-average window applied to the per-step signals
    pub smoothing_window: usize,
    /// Downscale decoded frames to this width (None = native)
    pub decode_max_width: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_fps: 30.0,
            flow_max_width: Some(480),
            dtw_radius: 1,
            dtw_exact_cells: 4_000_000,
            max_samples: 4000,
            smoothing_window: 9,
            decode_max_width: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_fps: env_parse("LAPCMP_DEFAULT_FPS")
                .filter(|fps: &f64| *fps > 0.0)
                .unwrap_or(defaults.default_fps),
            flow_max_width: match env_parse::<u32>("LAPCMP_FLOW_MAX_WIDTH") {
                Some(0) => None,
                Some(w) => Some(w),
                None => defaults.flow_max_width,
            },
            dtw_radius: env_parse("LAPCMP_DTW_RADIUS").unwrap_or(defaults.dtw_radius),
            dtw_exact_cells: env_parse("LAPCMP_DTW_EXACT_CELLS")
                .unwrap_or(defaults.dtw_exact_cells),
            max_samples: env_parse("LAPCMP_MAX_SAMPLES")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_samples),
            smoothing_window: env_parse("LAPCMP_SMOOTHING_WINDOW")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.smoothing_window),
            decode_max_width: env_parse::<u32>("LAPCMP_DECODE_MAX_WIDTH").filter(|w| *w > 0),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
