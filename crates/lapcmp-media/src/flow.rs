//! Dense optical flow.
//!
//! [`FlowEstimator`] is the seam between the engine and the flow backend.
//! The built-in backend is a pyramidal dense Lucas-Kanade solver: for every
//! pixel it solves the 2x2 structure-tensor system over a square window,
//! refining the estimate a few times per pyramid level. Window sums come from
//! integral images so the cost per level is linear in the pixel count.
//!
//! With the `opencv` feature, `crate::opencv_flow::FarnebackFlow` provides
//! OpenCV's Farneback estimator behind the same trait.

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

use crate::error::{MediaError, MediaResult};
use crate::signal::median;

/// Minimum eigenvalue (per window pixel) of the structure tensor for a
/// pixel to be considered trackable.
const MIN_EIGEN_PER_PIXEL: f64 = 1e-2;

/// Smallest pyramid level side, in pixels.
const MIN_LEVEL_SIDE: u32 = 8;

/// Parameters shared by the flow backends.
///
/// The names follow Farneback's. The Lucas-Kanade backend uses `poly_sigma`
/// as its per-level pre-smoothing scale; `poly_n` only applies to Farneback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowParams {
    /// Scale between consecutive pyramid levels (< 1)
    pub pyr_scale: f64,
    /// Number of pyramid levels including the full-resolution one
    pub levels: u32,
    /// Averaging window size
    pub win_size: u32,
    /// Refinement iterations per level
    pub iterations: u32,
    /// Pixel neighbourhood for polynomial expansion
    pub poly_n: u32,
    /// Gaussian sigma for smoothing
    pub poly_sigma: f64,
}

impl FlowParams {
    /// Settings for frame-to-frame drift estimation.
    pub const fn stabilization() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.1,
        }
    }

    /// Settings for speed/heading estimation; a wider window favours the
    /// dominant motion over local detail.
    pub const fn motion() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 25,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

/// Per-pixel displacement from one frame to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: u32,
    height: u32,
    dx: Vec<f32>,
    dy: Vec<f32>,
}

impl FlowField {
    pub fn new(width: u32, height: u32, dx: Vec<f32>, dy: Vec<f32>) -> MediaResult<Self> {
        let n = width as usize * height as usize;
        if dx.len() != n || dy.len() != n {
            return Err(MediaError::internal(format!(
                "flow field of {}x{} needs {} vectors, got {}/{}",
                width,
                height,
                n,
                dx.len(),
                dy.len()
            )));
        }
        Ok(Self {
            width,
            height,
            dx,
            dy,
        })
    }

    pub fn zeros(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            dx: vec![0.0; n],
            dy: vec![0.0; n],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Displacement at pixel `(x, y)`.
    pub fn at(&self, x: u32, y: u32) -> (f32, f32) {
        let i = y as usize * self.width as usize + x as usize;
        (self.dx[i], self.dy[i])
    }

    pub fn median_dx(&self) -> f64 {
        let mut values: Vec<f64> = self.dx.iter().map(|&v| v as f64).collect();
        median(&mut values)
    }

    pub fn median_dy(&self) -> f64 {
        let mut values: Vec<f64> = self.dy.iter().map(|&v| v as f64).collect();
        median(&mut values)
    }

    /// Median of the per-pixel vector length.
    pub fn median_magnitude(&self) -> f64 {
        let mut values: Vec<f64> = self
            .dx
            .iter()
            .zip(&self.dy)
            .map(|(&u, &v)| (u as f64).hypot(v as f64))
            .collect();
        median(&mut values)
    }

    /// Multiply every vector by `factor`.
    pub fn scaled(mut self, factor: f32) -> Self {
        self.dx.iter_mut().for_each(|v| *v *= factor);
        self.dy.iter_mut().for_each(|v| *v *= factor);
        self
    }
}

/// Dense flow backend.
pub trait FlowEstimator: Send + Sync {
    /// Flow from `prev` to `next`. Both frames have the same size.
    ///
    /// Vectors are in pixels of the input frames, even when the field itself
    /// is sampled on a coarser grid.
    fn estimate(&self, prev: &GrayImage, next: &GrayImage) -> MediaResult<FlowField>;
}

/// Pyramidal dense Lucas-Kanade estimator.
#[derive(Debug, Clone)]
pub struct PyramidLucasKanade {
    params: FlowParams,
    max_width: Option<u32>,
}

impl PyramidLucasKanade {
    pub fn new(params: FlowParams) -> Self {
        Self {
            params,
            max_width: None,
        }
    }

    /// Run on a copy no wider than `max_width` and rescale the vectors.
    pub fn with_max_width(mut self, max_width: Option<u32>) -> Self {
        self.max_width = max_width.filter(|w| *w > 0);
        self
    }

    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    fn pyramid(&self, img: &GrayImage) -> Vec<Plane> {
        let sigma = self.params.poly_sigma.max(0.1) as f32;
        let min_side = self.params.win_size.max(MIN_LEVEL_SIDE);
        let (w0, h0) = img.dimensions();

        let mut levels = vec![Plane::from_gray(&gaussian_blur_f32(img, sigma))];
        let mut scale = 1.0;
        for _ in 1..self.params.levels.max(1) {
            scale *= self.params.pyr_scale;
            let w = (w0 as f64 * scale).round() as u32;
            let h = (h0 as f64 * scale).round() as u32;
            if w < min_side || h < min_side {
                break;
            }
            let resized = imageops::resize(img, w, h, FilterType::Triangle);
            levels.push(Plane::from_gray(&gaussian_blur_f32(&resized, sigma)));
        }
        levels
    }

    fn estimate_full(&self, prev: &GrayImage, next: &GrayImage) -> FlowField {
        let p0 = self.pyramid(prev);
        let p1 = self.pyramid(next);
        let n_levels = p0.len().min(p1.len());

        let coarsest = &p0[n_levels - 1];
        let mut u = Plane::zeros(coarsest.w, coarsest.h);
        let mut v = Plane::zeros(coarsest.w, coarsest.h);

        for level in (0..n_levels).rev() {
            let (l0, l1) = (&p0[level], &p1[level]);
            if u.w != l0.w || u.h != l0.h {
                let factor = l0.w as f32 / u.w as f32;
                u = u.resample(l0.w, l0.h, factor);
                v = v.resample(l0.w, l0.h, factor);
            }
            refine_level(
                l0,
                l1,
                &mut u,
                &mut v,
                self.params.win_size as usize,
                self.params.iterations.max(1),
            );
        }

        FlowField {
            width: u.w as u32,
            height: u.h as u32,
            dx: u.data,
            dy: v.data,
        }
    }
}

impl FlowEstimator for PyramidLucasKanade {
    fn estimate(&self, prev: &GrayImage, next: &GrayImage) -> MediaResult<FlowField> {
        if prev.dimensions() != next.dimensions() {
            return Err(MediaError::internal(format!(
                "flow between frames of different sizes: {:?} vs {:?}",
                prev.dimensions(),
                next.dimensions()
            )));
        }
        let (w, h) = prev.dimensions();
        if w == 0 || h == 0 {
            return Ok(FlowField::zeros(w, h));
        }

        match self.max_width {
            Some(max) if w > max => {
                let sh = ((h as f64 * max as f64 / w as f64).round() as u32).max(1);
                let small_prev = imageops::resize(prev, max, sh, FilterType::Triangle);
                let small_next = imageops::resize(next, max, sh, FilterType::Triangle);
                let factor = w as f32 / max as f32;
                Ok(self.estimate_full(&small_prev, &small_next).scaled(factor))
            }
            _ => Ok(self.estimate_full(prev, next)),
        }
    }
}

/// Row-major f32 image with clamped sampling.
#[derive(Debug, Clone)]
struct Plane {
    w: usize,
    h: usize,
    data: Vec<f32>,
}

impl Plane {
    fn zeros(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0.0; w * h],
        }
    }

    fn from_gray(img: &GrayImage) -> Self {
        Self {
            w: img.width() as usize,
            h: img.height() as usize,
            data: img.as_raw().iter().map(|&p| p as f32).collect(),
        }
    }

    fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    /// Bilinear sample with edge clamping.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.w - 1) as f32;
        let max_y = (self.h - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.w - 1);
        let y1 = (y0 + 1).min(self.h - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x1, y0) * fx;
        let bottom = self.get(x0, y1) * (1.0 - fx) + self.get(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Resample to `w`x`h` (pixel-centre aligned) and multiply values by `factor`.
    fn resample(&self, w: usize, h: usize, factor: f32) -> Self {
        let sx = self.w as f32 / w as f32;
        let sy = self.h as f32 / h as f32;
        let mut out = Vec::with_capacity(w * h);
        for y in 0..h {
            let src_y = (y as f32 + 0.5) * sy - 0.5;
            for x in 0..w {
                let src_x = (x as f32 + 0.5) * sx - 0.5;
                out.push(self.sample(src_x, src_y) * factor);
            }
        }
        Self { w, h, data: out }
    }

    /// Central-difference gradients.
    fn gradients(&self) -> (Vec<f32>, Vec<f32>) {
        let (w, h) = (self.w, self.h);
        let mut gx = vec![0.0; w * h];
        let mut gy = vec![0.0; w * h];
        for y in 0..h {
            let ym = y.saturating_sub(1);
            let yp = (y + 1).min(h - 1);
            for x in 0..w {
                let xm = x.saturating_sub(1);
                let xp = (x + 1).min(w - 1);
                let i = y * w + x;
                let span_x = (xp - xm).max(1) as f32;
                let span_y = (yp - ym).max(1) as f32;
                gx[i] = (self.get(xp, y) - self.get(xm, y)) / span_x;
                gy[i] = (self.get(x, yp) - self.get(x, ym)) / span_y;
            }
        }
        (gx, gy)
    }
}

/// Summed-area table for O(1) window sums.
struct Integral {
    w: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(w: usize, h: usize, value: impl Fn(usize) -> f64) -> Self {
        let stride = w + 1;
        let mut sums = vec![0.0; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            for x in 0..w {
                row += value(y * w + x);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { w, sums }
    }

    /// Sum over the inclusive rectangle `[x0, x1] x [y0, y1]`.
    fn window(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let stride = self.w + 1;
        self.sums[(y1 + 1) * stride + x1 + 1] - self.sums[y0 * stride + x1 + 1]
            - self.sums[(y1 + 1) * stride + x0]
            + self.sums[y0 * stride + x0]
    }
}

/// Refine `(u, v)` on one pyramid level.
fn refine_level(
    prev: &Plane,
    next: &Plane,
    u: &mut Plane,
    v: &mut Plane,
    win_size: usize,
    iterations: u32,
) {
    let (w, h) = (prev.w, prev.h);
    let half = (win_size / 2).max(1);
    let max_step = half as f32;

    let (gx, gy) = prev.gradients();
    let sxx = Integral::new(w, h, |i| (gx[i] * gx[i]) as f64);
    let sxy = Integral::new(w, h, |i| (gx[i] * gy[i]) as f64);
    let syy = Integral::new(w, h, |i| (gy[i] * gy[i]) as f64);

    let mut residual = vec![0.0f32; w * h];
    for _ in 0..iterations {
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let warped = next.sample(x as f32 + u.data[i], y as f32 + v.data[i]);
                residual[i] = warped - prev.data[i];
            }
        }
        let sxt = Integral::new(w, h, |i| (gx[i] * residual[i]) as f64);
        let syt = Integral::new(w, h, |i| (gy[i] * residual[i]) as f64);

        for y in 0..h {
            let y0 = y.saturating_sub(half);
            let y1 = (y + half).min(h - 1);
            for x in 0..w {
                let x0 = x.saturating_sub(half);
                let x1 = (x + half).min(w - 1);
                let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;

                let a = sxx.window(x0, y0, x1, y1);
                let b = sxy.window(x0, y0, x1, y1);
                let c = syy.window(x0, y0, x1, y1);

                let trace_half = (a + c) / 2.0;
                let min_eigen = trace_half - (((a - c) / 2.0).powi(2) + b * b).sqrt();
                if min_eigen / area < MIN_EIGEN_PER_PIXEL {
                    continue;
                }

                let e = sxt.window(x0, y0, x1, y1);
                let f = syt.window(x0, y0, x1, y1);
                let det = a * c - b * b;
                let du = (-(c * e - b * f) / det) as f32;
                let dv = (-(a * f - b * e) / det) as f32;

                let i = y * w + x;
                u.data[i] += du.clamp(-max_step, max_step);
                v.data[i] += dv.clamp(-max_step, max_step);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn texture(w: u32, h: u32, shift_x: f32, shift_y: f32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let fx = x as f32 - shift_x;
            let fy = y as f32 - shift_y;
            let value = 128.0 + 50.0 * (fx / 5.0).sin() * (fy / 7.0).cos()
                + 30.0 * ((fx + fy) / 9.0).sin();
            Luma([value.clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn test_presets() {
        assert_eq!(FlowParams::stabilization().win_size, 15);
        assert_eq!(FlowParams::motion().win_size, 25);
        assert!((FlowParams::motion().poly_sigma - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_identical_frames_have_zero_flow() {
        let img = texture(64, 48, 0.0, 0.0);
        let flow = PyramidLucasKanade::new(FlowParams::stabilization())
            .estimate(&img, &img)
            .unwrap();
        assert_eq!((flow.width(), flow.height()), (64, 48));
        assert!(flow.median_magnitude() < 1e-3);
    }

    #[test]
    fn test_recovers_translation() {
        let prev = texture(96, 96, 0.0, 0.0);
        let next = texture(96, 96, 2.0, 1.0);
        let flow = PyramidLucasKanade::new(FlowParams::stabilization())
            .estimate(&prev, &next)
            .unwrap();

        assert!((flow.median_dx() - 2.0).abs() < 0.35, "dx = {}", flow.median_dx());
        assert!((flow.median_dy() - 1.0).abs() < 0.35, "dy = {}", flow.median_dy());
        assert!((flow.median_magnitude() - 5f64.sqrt()).abs() < 0.4);
    }

    #[test]
    fn test_downscaled_flow_is_in_input_pixels() {
        let prev = texture(128, 64, 0.0, 0.0);
        let next = texture(128, 64, 4.0, 0.0);
        let flow = PyramidLucasKanade::new(FlowParams::stabilization())
            .with_max_width(Some(64))
            .estimate(&prev, &next)
            .unwrap();

        assert_eq!(flow.width(), 64);
        assert!((flow.median_dx() - 4.0).abs() < 0.8, "dx = {}", flow.median_dx());
    }

    #[test]
    fn test_flat_frames_are_untrackable() {
        let a = GrayImage::from_pixel(32, 32, Luma([10]));
        let b = GrayImage::from_pixel(32, 32, Luma([200]));
        let flow = PyramidLucasKanade::new(FlowParams::motion())
            .estimate(&a, &b)
            .unwrap();
        assert_eq!(flow.median_magnitude(), 0.0);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let a = GrayImage::new(8, 8);
        let b = GrayImage::new(8, 9);
        assert!(PyramidLucasKanade::new(FlowParams::motion())
            .estimate(&a, &b)
            .is_err());
    }

    #[test]
    fn test_field_length_checked() {
        assert!(FlowField::new(2, 2, vec![0.0; 4], vec![0.0; 3]).is_err());
        let field = FlowField::new(2, 1, vec![3.0, 0.0], vec![4.0, 0.0]).unwrap();
        assert_eq!(field.at(0, 0), (3.0, 4.0));
        assert_eq!(field.median_magnitude(), 2.5);
    }
}
