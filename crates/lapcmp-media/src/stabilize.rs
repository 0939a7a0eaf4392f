//! Camera drift removal.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ensure_active, MediaResult};
use crate::flow::FlowEstimator;
use crate::frame::{to_gray, FrameSequence};

/// Offsets below this many pixels are treated as no motion.
const MIN_SHIFT_PX: f64 = 1e-3;

/// Remove accumulated camera translation from `frames`.
///
/// Frame 0 is the reference. Each later frame is shifted back by the running
/// sum of median flow between consecutive raw frames; uncovered pixels are
/// black. The output has the same length and frame size as the input.
///
/// Returns `MediaError::Cancelled` at the next frame once `cancel` fires.
pub fn stabilize(
    frames: &FrameSequence,
    estimator: &dyn FlowEstimator,
    cancel: &CancellationToken,
) -> MediaResult<FrameSequence> {
    let Some(first) = frames.frames.first() else {
        return Ok(frames.clone());
    };

    let mut out = Vec::with_capacity(frames.len());
    out.push(first.clone());

    let mut prev_gray = to_gray(first);
    let (mut dx, mut dy) = (0.0f64, 0.0f64);

    for (idx, frame) in frames.frames.iter().enumerate().skip(1) {
        ensure_active(cancel)?;
        let gray = to_gray(frame);
        let flow = estimator.estimate(&prev_gray, &gray)?;
        dx += flow.median_dx();
        dy += flow.median_dy();

        debug!(frame = idx, dx, dy, "Cumulative drift");
        out.push(shift_frame(frame, -dx, -dy));
        prev_gray = gray;
    }

    info!(
        frames = out.len(),
        drift_x = dx,
        drift_y = dy,
        "Stabilized sequence"
    );

    Ok(FrameSequence::new(out, frames.fps))
}

/// Translate `frame` by `(tx, ty)` pixels, filling with black.
pub fn shift_frame(frame: &RgbImage, tx: f64, ty: f64) -> RgbImage {
    if tx.abs() < MIN_SHIFT_PX && ty.abs() < MIN_SHIFT_PX {
        return frame.clone();
    }
    warp(
        frame,
        &Projection::translate(tx as f32, ty as f32),
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use crate::flow::{FlowField, FlowParams, PyramidLucasKanade};
    use image::GrayImage;

    /// Reports the same displacement for every frame pair.
    struct ConstantFlow(f32, f32);

    impl FlowEstimator for ConstantFlow {
        fn estimate(&self, prev: &GrayImage, _next: &GrayImage) -> Result<FlowField, MediaError> {
            let (w, h) = prev.dimensions();
            let n = (w * h) as usize;
            FlowField::new(w, h, vec![self.0; n], vec![self.1; n])
        }
    }

    fn sequence(n: usize) -> FrameSequence {
        let frames = (0..n)
            .map(|i| RgbImage::from_fn(20, 10, |x, y| Rgb([(x * 10) as u8, (y * 20) as u8, i as u8])))
            .collect();
        FrameSequence::new(frames, 25.0)
    }

    #[test]
    fn test_preserves_length_and_size() {
        let seq = sequence(5);
        let out = stabilize(
            &seq,
            &PyramidLucasKanade::new(FlowParams::stabilization()),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(out.len(), 5);
        assert!(out.frames.iter().all(|f| f.dimensions() == (20, 10)));
        assert_eq!(out.fps, 25.0);
        assert_eq!(out.frames[0], seq.frames[0]);
    }

    #[test]
    fn test_empty_sequence_is_noop() {
        let out = stabilize(
            &FrameSequence::new(Vec::new(), 30.0),
            &ConstantFlow(1.0, 0.0),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_cumulative_offset_shifts_back() {
        let seq = sequence(3);
        let out = stabilize(&seq, &ConstantFlow(2.0, 0.0), &CancellationToken::new()).unwrap();

        // Frame 2 has drifted 4 px right; shifting back exposes black on the right.
        let last = &out.frames[2];
        assert_eq!(last.get_pixel(19, 5), &Rgb([0, 0, 0]));
        assert_eq!(last.get_pixel(0, 5), seq.frames[2].get_pixel(4, 5));
    }

    #[test]
    fn test_cancelled_token_stops_before_flow() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = stabilize(&sequence(4), &ConstantFlow(1.0, 0.0), &cancel).unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }
}
