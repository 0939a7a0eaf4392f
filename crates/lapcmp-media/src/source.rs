//! Frame source: decode a whole video into memory.
//!
//! Frames are pulled from FFmpeg as packed `rgb24` on stdout and sliced
//! into fixed-size images. The probe runs first so the frame size is known
//! before any bytes arrive; the scale filter pins the output to that size.

use image::RgbImage;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::{check_ffmpeg, stderr_tail};
use crate::error::{MediaError, MediaResult};
use crate::frame::FrameSequence;
use crate::probe::{probe_video, VideoInfo};

/// A decoded video and what the probe reported about it.
#[derive(Debug, Clone)]
pub struct DecodedVideo {
    pub frames: FrameSequence,
    pub info: VideoInfo,
}

/// Decode `path` into a frame sequence.
///
/// `fallback_fps` is used when the container has no usable frame rate.
/// With `max_width`, wider videos are downscaled (aspect preserved).
pub async fn decode_video(
    path: impl AsRef<Path>,
    fallback_fps: f64,
    max_width: Option<u32>,
) -> MediaResult<DecodedVideo> {
    let path = path.as_ref();

    let info = match probe_video(path).await {
        Ok(info) => info,
        Err(MediaError::FfprobeNotFound) => return Err(MediaError::FfprobeNotFound),
        Err(e) => return Err(MediaError::decode(path, e.to_string())),
    };
    if info.width == 0 || info.height == 0 {
        return Err(MediaError::decode(path, "video stream has no dimensions"));
    }

    let (width, height) = decode_size(info.width, info.height, max_width);

    check_ffmpeg()?;

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-i"])
        .arg(path)
        .args([
            "-an",
            "-vf",
            &format!("scale={}:{}", width, height),
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(path = %path.display(), width, height, "Decoding video via FFmpeg rawvideo");

    let output = cmd
        .output()
        .await
        .map_err(|e| MediaError::decode(path, format!("failed to run FFmpeg: {}", e)))?;

    let frames = slice_frames(&output.stdout, width, height);

    if !output.status.success() {
        if frames.is_empty() {
            return Err(MediaError::decode(path, stderr_tail(&output.stderr)));
        }
        warn!(
            path = %path.display(),
            exit_code = ?output.status.code(),
            "FFmpeg reported an error after {} frames; keeping decoded frames",
            frames.len()
        );
    }

    if frames.is_empty() {
        return Err(MediaError::decode(path, "no frames decoded"));
    }

    let fps = info.fps.unwrap_or(fallback_fps);
    info!(
        path = %path.display(),
        frames = frames.len(),
        fps,
        "Decoded {} frames at {}x{}",
        frames.len(),
        width,
        height
    );

    Ok(DecodedVideo {
        frames: FrameSequence::new(frames, fps),
        info,
    })
}

/// Output size for decoding, honouring an optional width cap.
fn decode_size(width: u32, height: u32, max_width: Option<u32>) -> (u32, u32) {
    match max_width {
        Some(max) if max > 0 && width > max => {
            let w = (max & !1).max(2);
            let h = (height as f64 * w as f64 / width as f64).round() as u32;
            (w, ((h + 1) & !1).max(2))
        }
        _ => (width, height),
    }
}

/// Split packed rgb24 bytes into frames; a trailing partial frame is dropped.
fn slice_frames(buffer: &[u8], width: u32, height: u32) -> Vec<RgbImage> {
    let bytes_per_frame = width as usize * height as usize * 3;
    if bytes_per_frame == 0 {
        return Vec::new();
    }
    buffer
        .chunks_exact(bytes_per_frame)
        .filter_map(|chunk| RgbImage::from_raw(width, height, chunk.to_vec()))
        .collect()
}
