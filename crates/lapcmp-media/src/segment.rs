//! Sub-clip extraction by timestamp.

use lapcmp_models::SegmentRange;
use std::path::Path;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Build the stream-copy command for one range.
pub fn segment_command(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    range: SegmentRange,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output).seek(range.start.max(0.0));
    if let Some(end) = range.end_bound() {
        cmd = cmd.end_at(end);
    }
    cmd.codec_copy()
}

/// Copy `range` of `input` into `output` without re-encoding.
///
/// An unbounded range runs to the end of the source.
pub async fn cut_segment(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    range: SegmentRange,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    info!(
        "Extracting segment: {} -> {} (start: {:.2}s, end: {})",
        input.display(),
        output.display(),
        range.start,
        range
            .end_bound()
            .map(|e| format!("{:.2}s", e))
            .unwrap_or_else(|| "source end".to_string())
    );

    let cmd = segment_command(input, output, range);
    FfmpegRunner::new().run(&cmd).await.map_err(|e| match e {
        MediaError::FfmpegFailed {
            message, stderr, ..
        } => MediaError::SegmentExtraction {
            path: input.to_path_buf(),
            message,
            stderr,
        },
        other => other,
    })?;

    info!("Segment extracted: {}", output.display());
    Ok(())
}
