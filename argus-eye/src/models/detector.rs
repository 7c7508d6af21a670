//! Object detector contract

use argus_core::{BoundingBox, Result};
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One unfiltered detection as reported by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_name: String,
    pub confidence: f64,
    /// Corner coordinates (x1, y1, x2, y2) in pixels
    pub bbox: [f64; 4],
}

impl RawDetection {
    pub fn new(class_name: &str, confidence: f64, bbox: [f64; 4]) -> Self {
        Self {
            class_name: class_name.to_string(),
            confidence,
            bbox,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let [x1, y1, x2, y2] = self.bbox;
        BoundingBox::from_corners(x1, y1, x2, y2)
    }
}

#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, frame: &RgbImage) -> Result<Vec<RawDetection>>;

    fn model_name(&self) -> String;
}

/// Backend used when no object model is configured; reports an empty scene
#[derive(Debug, Default)]
pub struct DisabledObjectDetector;

#[async_trait]
impl ObjectDetector for DisabledObjectDetector {
    async fn detect(&self, _frame: &RgbImage) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }

    fn model_name(&self) -> String {
        "disabled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_to_box() {
        let detection = RawDetection::new("book", 0.7, [10.0, 20.0, 50.0, 80.0]);
        assert_eq!(detection.bounding_box(), BoundingBox::new(10.0, 20.0, 40.0, 60.0));
    }

    #[test]
    fn test_disabled_detector_reports_empty_scene() {
        let frame = RgbImage::new(16, 16);
        let detections = tokio_test::block_on(DisabledObjectDetector.detect(&frame)).unwrap();
        assert!(detections.is_empty());
    }
}
