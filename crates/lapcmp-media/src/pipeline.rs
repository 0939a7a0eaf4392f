//! End-to-end analysis of a pair of recordings.
//!
//! Decoding and encoding talk to FFmpeg asynchronously; the numeric stages
//! (stabilization, motion proxy, alignment) run on the blocking pool. Dropping
//! an analysis future, on a job timeout or an aborted task, cancels the
//! blocking work at the next frame or cost-matrix row.

use lapcmp_models::{Insights, SegmentRange, ANALYSIS_SUMMARY, INSIGHTS_FILE, METRICS_FILE, OVERLAY_FILE};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::align::{align_signals, shared_fps, Alignment, DtwSettings};
use crate::config::EngineConfig;
use crate::error::{MediaError, MediaResult};
use crate::flow::{FlowEstimator, FlowParams};
use crate::frame::FrameSequence;
use crate::motion::{extract_motion_proxy, MotionProxySignal, ProxySettings};
use crate::overlay::render_overlay;
use crate::segment::cut_segment;
use crate::source::decode_video;
use crate::stabilize::stabilize;

/// Sub-clip names written by segments mode.
pub const SEGMENT_A_FILE: &str = "A.mp4";
pub const SEGMENT_B_FILE: &str = "B.mp4";

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub summary: String,
    /// Artifact file names inside the output directory
    pub files: Vec<String>,
}

#[cfg(feature = "opencv")]
fn flow_estimator(params: FlowParams, cfg: &EngineConfig) -> Box<dyn FlowEstimator> {
    Box::new(crate::opencv_flow::FarnebackFlow::new(params).with_max_width(cfg.flow_max_width))
}

#[cfg(not(feature = "opencv"))]
fn flow_estimator(params: FlowParams, cfg: &EngineConfig) -> Box<dyn FlowEstimator> {
    Box::new(crate::flow::PyramidLucasKanade::new(params).with_max_width(cfg.flow_max_width))
}

/// Stabilized sequences plus everything derived from them.
struct Analyzed {
    stable_a: FrameSequence,
    stable_b: FrameSequence,
    signal_a: MotionProxySignal,
    alignment: Alignment,
}

fn analyze_frames(
    frames_a: FrameSequence,
    frames_b: FrameSequence,
    fps: f64,
    cfg: &EngineConfig,
    cancel: &CancellationToken,
) -> MediaResult<Analyzed> {
    let stabilizer = flow_estimator(FlowParams::stabilization(), cfg);
    let motion = flow_estimator(FlowParams::motion(), cfg);
    let proxy = ProxySettings::from(cfg);

    let stable_a = stabilize(&frames_a, stabilizer.as_ref(), cancel)?;
    drop(frames_a);
    let signal_a = extract_motion_proxy(&stable_a, motion.as_ref(), fps, proxy, cancel)?;

    let stable_b = stabilize(&frames_b, stabilizer.as_ref(), cancel)?;
    drop(frames_b);
    let signal_b = extract_motion_proxy(&stable_b, motion.as_ref(), fps, proxy, cancel)?;

    let alignment = align_signals(&signal_a, &signal_b, fps, DtwSettings::from(cfg), cancel)?;

    Ok(Analyzed {
        stable_a,
        stable_b,
        signal_a,
        alignment,
    })
}

/// Run `work` on the blocking pool.
///
/// `work` receives a token that is cancelled when the returned future is
/// dropped before completion.
async fn run_blocking<T, F>(work: F) -> MediaResult<T>
where
    F: FnOnce(CancellationToken) -> MediaResult<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let result = tokio::task::spawn_blocking(move || work(cancel))
        .await
        .map_err(|e| MediaError::internal(format!("analysis task failed: {}", e)))?;

    guard.disarm();
    result
}

/// Analyze two recordings and write the result bundle into `out_dir`.
#[instrument(skip_all, fields(a = %path_a.as_ref().display(), b = %path_b.as_ref().display()))]
pub async fn analyze_pair(
    path_a: impl AsRef<Path>,
    path_b: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    cfg: &EngineConfig,
) -> MediaResult<AnalysisOutcome> {
    let out_dir = out_dir.as_ref();
    tokio::fs::create_dir_all(out_dir).await?;

    let decoded_a = decode_video(path_a.as_ref(), cfg.default_fps, cfg.decode_max_width).await?;
    let decoded_b = decode_video(path_b.as_ref(), cfg.default_fps, cfg.decode_max_width).await?;
    let fps = shared_fps(decoded_a.info.fps, decoded_b.info.fps, cfg.default_fps);

    let engine_cfg = cfg.clone();
    let Analyzed {
        stable_a,
        stable_b,
        signal_a,
        alignment,
    } = run_blocking(move |cancel| {
        analyze_frames(decoded_a.frames, decoded_b.frames, fps, &engine_cfg, &cancel)
    })
    .await?;

    let mut files = Vec::with_capacity(3);

    let overlay_path = out_dir.join(OVERLAY_FILE);
    let rendered = render_overlay(
        stable_a,
        stable_b,
        alignment.delta_t.clone(),
        fps,
        &overlay_path,
    )
    .await?;
    if rendered.is_some() {
        files.push(OVERLAY_FILE.to_string());
    }

    let metrics = metrics_csv(&signal_a.s, &alignment.delta_t);
    tokio::fs::write(out_dir.join(METRICS_FILE), metrics).await?;
    files.push(METRICS_FILE.to_string());

    let insights = serde_json::to_vec(&Insights::default())?;
    tokio::fs::write(out_dir.join(INSIGHTS_FILE), insights).await?;
    files.push(INSIGHTS_FILE.to_string());

    info!(
        fps,
        path_len = alignment.path.len(),
        files = ?files,
        "Analysis complete"
    );

    Ok(AnalysisOutcome {
        summary: ANALYSIS_SUMMARY.to_string(),
        files,
    })
}

/// Cut two ranges out of one recording and analyze them as a pair.
pub async fn analyze_segments(
    video: impl AsRef<Path>,
    seg_a: SegmentRange,
    seg_b: SegmentRange,
    out_dir: impl AsRef<Path>,
    cfg: &EngineConfig,
) -> MediaResult<AnalysisOutcome> {
    let out_dir = out_dir.as_ref();
    tokio::fs::create_dir_all(out_dir).await?;

    let (clip_a, clip_b): (PathBuf, PathBuf) =
        (out_dir.join(SEGMENT_A_FILE), out_dir.join(SEGMENT_B_FILE));
    cut_segment(video.as_ref(), &clip_a, seg_a).await?;
    cut_segment(video.as_ref(), &clip_b, seg_b).await?;

    analyze_pair(&clip_a, &clip_b, out_dir, cfg).await
}

/// `distance,deltaT` rows for the first `min(len(s), len(delta_t))` samples.
pub fn metrics_csv(s: &[f64], delta_t: &[f64]) -> String {
    let mut out = String::from("distance,deltaT\n");
    for (distance, delta) in s.iter().zip(delta_t) {
        let _ = writeln!(out, "{},{}", format_float(*distance), format_float(*delta));
    }
    out
}

/// Shortest round-trip form, always with a decimal point for whole numbers.
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_metrics_csv_truncates_to_shorter() {
        let csv = metrics_csv(&[0.0, 0.5, 1.25], &[0.0, -0.1]);
        assert_eq!(csv, "distance,deltaT\n0.0,0.0\n0.5,-0.1\n");
    }

    #[test]
    fn test_metrics_csv_header_only() {
        assert_eq!(metrics_csv(&[], &[1.0]), "distance,deltaT\n");
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(-0.0333), "-0.0333");
    }

    #[tokio::test]
    async fn test_blocking_work_result_is_returned() {
        let value = run_blocking(|cancel| Ok(cancel.is_cancelled())).await.unwrap();
        assert!(!value);
    }

    #[tokio::test]
    async fn test_dropped_run_cancels_blocking_work() {
        let (stopped_tx, stopped_rx) = mpsc::channel();
        let run = run_blocking(move |cancel| {
            while !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(2));
            }
            let _ = stopped_tx.send(());
            Err::<(), _>(MediaError::Cancelled)
        });

        // Same shape as the worker's job timeout: the future is dropped unfinished.
        let timed_out = tokio::time::timeout(Duration::from_millis(30), run).await;
        assert!(timed_out.is_err());

        let stopped = tokio::task::spawn_blocking(move || stopped_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(stopped.is_ok(), "blocking work kept running after the run was dropped");
    }

    #[tokio::test]
    async fn test_missing_input_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = analyze_pair(
            dir.path().join("nope_a.mp4"),
            dir.path().join("nope_b.mp4"),
            dir.path().join("out"),
            &EngineConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(err, MediaError::Decode { .. } | MediaError::FfprobeNotFound),
            "unexpected error: {err}"
        );
    }
}
