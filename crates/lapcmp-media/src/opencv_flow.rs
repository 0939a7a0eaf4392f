//! OpenCV Farneback flow backend (feature `opencv`).

use image::imageops::{self, FilterType};
use image::GrayImage;
use opencv::core::{self, Mat, Vec2f};
use opencv::prelude::*;
use opencv::video;

use crate::error::{MediaError, MediaResult};
use crate::flow::{FlowEstimator, FlowField, FlowParams};

/// Farneback dense flow through OpenCV.
#[derive(Debug, Clone)]
pub struct FarnebackFlow {
    params: FlowParams,
    max_width: Option<u32>,
}

impl FarnebackFlow {
    pub fn new(params: FlowParams) -> Self {
        Self {
            params,
            max_width: None,
        }
    }

    pub fn with_max_width(mut self, max_width: Option<u32>) -> Self {
        self.max_width = max_width.filter(|w| *w > 0);
        self
    }

    fn compute(&self, prev: &GrayImage, next: &GrayImage) -> MediaResult<FlowField> {
        let prev_mat = gray_to_mat(prev)?;
        let next_mat = gray_to_mat(next)?;

        let mut flow = Mat::default();
        video::calc_optical_flow_farneback(
            &prev_mat,
            &next_mat,
            &mut flow,
            self.params.pyr_scale,
            self.params.levels as i32,
            self.params.win_size as i32,
            self.params.iterations as i32,
            self.params.poly_n as i32,
            self.params.poly_sigma,
            0,
        )?;

        let (w, h) = prev.dimensions();
        let mut dx = Vec::with_capacity(w as usize * h as usize);
        let mut dy = Vec::with_capacity(w as usize * h as usize);
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                let vec = flow.at_2d::<Vec2f>(y, x)?;
                dx.push(vec[0]);
                dy.push(vec[1]);
            }
        }
        FlowField::new(w, h, dx, dy)
    }
}

impl FlowEstimator for FarnebackFlow {
    fn estimate(&self, prev: &GrayImage, next: &GrayImage) -> MediaResult<FlowField> {
        if prev.dimensions() != next.dimensions() {
            return Err(MediaError::internal("flow between frames of different sizes"));
        }
        let (w, h) = prev.dimensions();
        match self.max_width {
            Some(max) if w > max => {
                let sh = ((h as f64 * max as f64 / w as f64).round() as u32).max(1);
                let small_prev = imageops::resize(prev, max, sh, FilterType::Triangle);
                let small_next = imageops::resize(next, max, sh, FilterType::Triangle);
                Ok(self
                    .compute(&small_prev, &small_next)?
                    .scaled(w as f32 / max as f32))
            }
            _ => self.compute(prev, next),
        }
    }
}

fn gray_to_mat(img: &GrayImage) -> MediaResult<Mat> {
    let (w, h) = img.dimensions();
    // The borrowed Mat only lives until the clone below.
    let borrowed = unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            h as i32,
            w as i32,
            core::CV_8UC1,
            img.as_raw().as_ptr() as *mut _,
            core::Mat_AUTO_STEP,
        )
    }?;
    Ok(borrowed.try_clone()?)
}
