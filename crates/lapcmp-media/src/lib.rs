//! Motion-proxy alignment engine.
//!
//! This crate provides:
//! - FFmpeg/FFprobe wrappers (probe, rawvideo decode, stream-copy cuts)
//! - Dense optical flow behind the [`FlowEstimator`] trait
//! - Stabilization, motion proxy extraction and DTW alignment
//! - Side-by-side overlay rendering and the result bundle writer

pub mod align;
pub mod command;
pub mod config;
pub mod error;
pub mod flow;
pub mod frame;
pub mod glyphs;
pub mod motion;
#[cfg(feature = "opencv")]
pub mod opencv_flow;
pub mod overlay;
pub mod pipeline;
pub mod probe;
pub mod segment;
pub mod signal;
pub mod source;
pub mod stabilize;

pub use align::{align_signals, shared_fps, Alignment, DtwSettings};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use config::EngineConfig;
pub use error::{MediaError, MediaResult};
pub use flow::{FlowEstimator, FlowField, FlowParams, PyramidLucasKanade};
pub use frame::FrameSequence;
pub use motion::{extract_motion_proxy, MotionProxySignal, ProxySettings};
#[cfg(feature = "opencv")]
pub use opencv_flow::FarnebackFlow;
pub use overlay::{format_delta_label, render_overlay};
pub use pipeline::{analyze_pair, analyze_segments, AnalysisOutcome};
pub use probe::{probe_video, VideoInfo};
pub use segment::cut_segment;
pub use source::{decode_video, DecodedVideo};
pub use stabilize::stabilize;
