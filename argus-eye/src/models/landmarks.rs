//! Facial landmark estimator contract

use argus_core::{BoundingBox, Result};
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Landmarks required by the head-pose solver.
///
/// Points are pixel coordinates in the frame handed to the estimator.
/// "Left" and "right" follow image order, not the subject's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub nose_tip: [f64; 2],
    pub chin: [f64; 2],
    pub left_eye_corner: [f64; 2],
    pub right_eye_corner: [f64; 2],
    pub left_mouth_corner: [f64; 2],
    pub right_mouth_corner: [f64; 2],
    /// Size of the full mesh the estimator produced
    #[serde(default)]
    pub landmark_count: usize,
    /// Normalized (x, y, w, h) boxes
    #[serde(default)]
    pub face_box: Option<BoundingBox>,
    #[serde(default)]
    pub left_eye: Option<BoundingBox>,
    #[serde(default)]
    pub right_eye: Option<BoundingBox>,
}

impl FaceLandmarks {
    /// Points in solver order, nose tip first
    pub fn points(&self) -> [[f64; 2]; 6] {
        [
            self.nose_tip,
            self.chin,
            self.left_eye_corner,
            self.right_eye_corner,
            self.left_mouth_corner,
            self.right_mouth_corner,
        ]
    }
}

#[async_trait]
pub trait LandmarkEstimator: Send + Sync {
    /// `Ok(None)` means no face was found
    async fn estimate(&self, frame: &RgbImage) -> Result<Option<FaceLandmarks>>;

    fn model_name(&self) -> String;
}

/// Backend used when no landmark model is configured; never finds a face
#[derive(Debug, Default)]
pub struct DisabledLandmarkEstimator;

#[async_trait]
impl LandmarkEstimator for DisabledLandmarkEstimator {
    async fn estimate(&self, _frame: &RgbImage) -> Result<Option<FaceLandmarks>> {
        Ok(None)
    }

    fn model_name(&self) -> String {
        "disabled".to_string()
    }
}
