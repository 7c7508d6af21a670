//! Image conditioning for the gaze stream
//!
//! Chain order is fixed: gamma LUT, then edge-preserving bilateral
//! smoothing, then contrast-limited adaptive histogram equalization on
//! the luma channel only. An optional top-anchored crop narrows the
//! frame further. The object stream never sees any of this.

use argus_core::{ConditioningConfig, ProctorError, Result, RoiInfo};
use image::{imageops, RgbImage};
use opencv::core::{self, Mat, Scalar, Size, Vector, BORDER_DEFAULT, CV_8UC1, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

/// Frame handed to the landmark estimator plus the crop applied to it
#[derive(Debug, Clone)]
pub struct ConditionedFrame {
    pub image: RgbImage,
    pub roi: RoiInfo,
}

pub struct FrameConditioner {
    config: ConditioningConfig,
    gamma_lut: [u8; 256],
}

impl FrameConditioner {
    pub fn new(config: ConditioningConfig) -> Self {
        let gamma_lut = gamma_table(config.gamma);
        Self { config, gamma_lut }
    }

    pub fn config(&self) -> &ConditioningConfig {
        &self.config
    }

    /// Run the enabled stages and the ROI crop over a copy of `frame`
    pub fn condition(&self, frame: &RgbImage) -> Result<ConditionedFrame> {
        let image = if self.config.enabled && self.any_stage_enabled() {
            self.enhance(frame)
                .map_err(|e| ProctorError::Image(format!("Failed to condition frame: {}", e)))?
        } else {
            frame.clone()
        };

        let (image, roi) = self.extract_roi(image);
        Ok(ConditionedFrame { image, roi })
    }

    fn any_stage_enabled(&self) -> bool {
        self.config.gamma_enabled || self.config.bilateral_enabled || self.config.clahe_enabled
    }

    fn enhance(&self, frame: &RgbImage) -> opencv::Result<RgbImage> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(frame.clone());
        }

        let mut mat = rgb_to_mat(frame)?;
        if self.config.gamma_enabled {
            mat = self.apply_gamma(&mat)?;
        }
        if self.config.bilateral_enabled {
            mat = bilateral_filter(
                &mat,
                self.config.bilateral_diameter,
                self.config.bilateral_sigma_color,
                self.config.bilateral_sigma_space,
            )?;
        }
        if self.config.clahe_enabled {
            mat = equalize_luma(&mat, self.config.clahe_clip_limit, self.config.clahe_tiles)?;
        }
        mat_to_rgb(&mat)
    }

    pub fn apply_gamma(&self, mat: &Mat) -> opencv::Result<Mat> {
        let table = mat_from_bytes(1, 256, CV_8UC1, &self.gamma_lut)?;
        let mut out = Mat::default();
        core::lut(mat, &table, &mut out)?;
        Ok(out)
    }

    /// Keep the top `roi_ratio` of the frame when ROI is enabled
    pub fn extract_roi(&self, image: RgbImage) -> (RgbImage, RoiInfo) {
        let (width, height) = image.dimensions();

        if !self.config.roi_enabled || height == 0 {
            let info = RoiInfo {
                enabled: false,
                original_size: (width, height),
                roi_size: (width, height),
                offset: (0, 0),
                reduction_ratio: 1.0,
            };
            return (image, info);
        }

        let roi_height = ((height as f64 * self.config.roi_ratio) as u32).clamp(1, height);
        let cropped = imageops::crop_imm(&image, 0, 0, width, roi_height).to_image();

        let info = RoiInfo {
            enabled: true,
            original_size: (width, height),
            roi_size: (width, roi_height),
            offset: (0, 0),
            reduction_ratio: roi_height as f64 / height as f64,
        };
        (cropped, info)
    }
}

fn gamma_table(gamma: f64) -> [u8; 256] {
    let inverse = 1.0 / gamma.max(f64::EPSILON);
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let value = (i as f64 / 255.0).powf(inverse) * 255.0;
        *entry = value.round().clamp(0.0, 255.0) as u8;
    }
    table
}

fn mat_from_bytes(rows: i32, cols: i32, typ: i32, bytes: &[u8]) -> opencv::Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(rows, cols, typ, Scalar::all(0.0))?;
    let data = mat.data_bytes_mut()?;
    if data.len() != bytes.len() {
        return Err(opencv::Error::new(
            core::StsUnmatchedSizes,
            format!("Expected {} bytes, got {}", data.len(), bytes.len()),
        ));
    }
    data.copy_from_slice(bytes);
    Ok(mat)
}

/// Copy an RGB buffer into a CV_8UC3 Mat, channel order unchanged
pub fn rgb_to_mat(image: &RgbImage) -> opencv::Result<Mat> {
    let (width, height) = image.dimensions();
    mat_from_bytes(height as i32, width as i32, CV_8UC3, image.as_raw())
}

pub fn mat_to_rgb(mat: &Mat) -> opencv::Result<RgbImage> {
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let bytes = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        mat.try_clone()?.data_bytes()?.to_vec()
    };
    RgbImage::from_raw(width, height, bytes).ok_or_else(|| {
        opencv::Error::new(core::StsBadSize, "Mat is not a packed 8-bit RGB image".to_string())
    })
}

/// Bilateral filter with OpenCV's default border handling
pub fn bilateral_filter(mat: &Mat, diameter: u32, sigma_color: f64, sigma_space: f64) -> opencv::Result<Mat> {
    let mut out = Mat::default();
    imgproc::bilateral_filter(
        mat,
        &mut out,
        diameter.max(1) as i32,
        sigma_color,
        sigma_space,
        BORDER_DEFAULT,
    )?;
    Ok(out)
}

/// CLAHE applied to the luma plane of a YCrCb split, chroma untouched
pub fn equalize_luma(mat: &Mat, clip_limit: f64, tiles: u32) -> opencv::Result<Mat> {
    let grid = Size::new(
        tiles.clamp(1, mat.cols().max(1) as u32) as i32,
        tiles.clamp(1, mat.rows().max(1) as u32) as i32,
    );

    let mut ycrcb = Mat::default();
    imgproc::cvt_color(mat, &mut ycrcb, imgproc::COLOR_RGB2YCrCb, 0)?;

    let mut planes = Vector::<Mat>::new();
    core::split(&ycrcb, &mut planes)?;

    let luma = planes.get(0)?;
    let mut equalized = Mat::default();
    let mut clahe = imgproc::create_clahe(clip_limit, grid)?;
    clahe.apply(&luma, &mut equalized)?;
    planes.set(0, equalized)?;

    let mut merged = Mat::default();
    core::merge(&planes, &mut merged)?;

    let mut out = Mat::default();
    imgproc::cvt_color(&merged, &mut out, imgproc::COLOR_YCrCb2RGB, 0)?;
    Ok(out)
}
