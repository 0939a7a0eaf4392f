//! Side-by-side overlay rendering.
//!
//! Frames are composed in memory and streamed as rgb24 into an FFmpeg
//! encoder over stdin, one frame at a time.

use image::{imageops, Rgb, RgbImage};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::command::{check_ffmpeg, stderr_tail};
use crate::error::{MediaError, MediaResult};
use crate::frame::FrameSequence;
use crate::glyphs::{draw_text, GLYPH_HEIGHT};

const LABEL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_SCALE: u32 = 3;
const LABEL_X: i32 = 30;
/// Baseline of the label; glyphs hang above it.
const LABEL_BASELINE: i32 = 40;
/// Composite frames buffered ahead of the encoder.
const COMPOSE_QUEUE_DEPTH: usize = 4;

/// Annotation burned into each composite frame.
pub fn format_delta_label(delta_t: f64) -> String {
    format!("ΔT: {:+.2} s (B vs A)", delta_t)
}

/// Number of composite frames for the given inputs.
pub fn overlay_frame_count(a: &FrameSequence, b: &FrameSequence, delta_t: &[f64]) -> usize {
    a.len().min(b.len()).min(delta_t.len())
}

/// Encoder canvas size: A and B side by side, rounded up to even numbers.
pub fn canvas_size(a: (u32, u32), b: (u32, u32)) -> (u32, u32) {
    let width = a.0 + b.0;
    let height = a.1.max(b.1);
    (width + width % 2, height + height % 2)
}

/// One composite frame: A on the left, B on the right, black padding, label.
pub fn compose_frame(a: &RgbImage, b: &RgbImage, canvas: (u32, u32), delta_t: f64) -> RgbImage {
    let mut out = RgbImage::new(canvas.0, canvas.1);
    imageops::replace(&mut out, a, 0, 0);
    imageops::replace(&mut out, b, a.width() as i64, 0);

    let top = LABEL_BASELINE - (GLYPH_HEIGHT * LABEL_SCALE) as i32;
    draw_text(
        &mut out,
        &format_delta_label(delta_t),
        LABEL_X,
        top,
        LABEL_SCALE,
        LABEL_COLOR,
    );
    out
}

/// Render the overlay video to `output`.
///
/// Frame `i` pairs `a[i]` with `b[i]` and `delta_t[i]`. Returns the number of
/// frames written, or `None` (and writes nothing) when either input is empty.
/// Composition runs on the blocking pool and stops once the returned future
/// is dropped.
pub async fn render_overlay(
    a: FrameSequence,
    b: FrameSequence,
    delta_t: Vec<f64>,
    fps: f64,
    output: impl AsRef<Path>,
) -> MediaResult<Option<usize>> {
    let output = output.as_ref();
    let (Some(dims_a), Some(dims_b)) = (a.dimensions(), b.dimensions()) else {
        info!("Overlay skipped: empty input sequence");
        return Ok(None);
    };

    let count = overlay_frame_count(&a, &b, &delta_t);
    let canvas = canvas_size(dims_a, dims_b);

    check_ffmpeg()?;

    let args = encoder_args(canvas, fps, output);
    debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| MediaError::internal("FFmpeg stdin not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

    // Drain stderr concurrently so the encoder never blocks on a full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let (tx, mut rx) = mpsc::channel::<RgbImage>(COMPOSE_QUEUE_DEPTH);
    let composer = tokio::task::spawn_blocking(move || {
        for i in 0..count {
            let frame = compose_frame(&a.frames[i], &b.frames[i], canvas, delta_t[i]);
            // Receiver gone: the encoder failed or the render was dropped.
            if tx.blocking_send(frame).is_err() {
                break;
            }
        }
    });

    let mut write_error = None;
    while let Some(frame) = rx.recv().await {
        if let Err(e) = stdin.write_all(frame.as_raw()).await {
            write_error = Some(e);
            break;
        }
    }
    drop(rx);
    drop(stdin);

    composer
        .await
        .map_err(|e| MediaError::internal(format!("overlay composer failed: {}", e)))?;
    let status = child.wait().await?;
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        return Err(MediaError::ffmpeg_failed(
            "overlay encoding failed",
            Some(stderr_tail(&stderr)),
            status.code(),
        ));
    }
    if let Some(e) = write_error {
        return Err(MediaError::Io(e));
    }

    info!(
        frames = count,
        width = canvas.0,
        height = canvas.1,
        path = %output.display(),
        "Rendered overlay"
    );
    Ok(Some(count))
}

fn encoder_args(canvas: (u32, u32), fps: f64, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        format!("{}x{}", canvas.0, canvas.1),
        "-framerate".into(),
        format!("{}", fps),
        "-i".into(),
        "pipe:0".into(),
        "-an".into(),
        "-c:v".into(),
        "mpeg4".into(),
        "-q:v".into(),
        "4".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        output.to_string_lossy().to_string(),
    ]
}
