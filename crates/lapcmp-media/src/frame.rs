//! Decoded frame sequences.

use image::{GrayImage, RgbImage};

/// An ordered list of frames sharing one size, plus the capture rate.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    pub frames: Vec<RgbImage>,
    /// Frames per second, always > 0
    pub fps: f64,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self { frames, fps }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Width and height of the frames, `None` when empty.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(|f| f.dimensions())
    }
}

/// Luma conversion used by every flow computation.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_dimensions() {
        let seq = FrameSequence::new(vec![RgbImage::from_pixel(8, 4, Rgb([1, 2, 3]))], 30.0);
        assert_eq!(seq.dimensions(), Some((8, 4)));
        assert_eq!(FrameSequence::new(Vec::new(), 30.0).dimensions(), None);
    }
}
