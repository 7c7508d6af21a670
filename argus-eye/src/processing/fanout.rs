//! Concurrent detection fan-out
//!
//! The gaze branch (landmarks, head pose, deviation tracker) and the
//! object branch run as separate tasks. Each branch resolves to its own
//! result; an error or panic in one is replaced by that stream's neutral
//! reading and never touches the other.

use super::conditioning::ConditionedFrame;
use super::gaze::GazeTracker;
use super::objects::ObjectFilter;
use crate::models::{LandmarkEstimator, ObjectDetector};
use argus_core::{DetectionBundle, GazeReading, ObjectReading, ProctorError, RoiInfo};
use image::RgbImage;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, warn};

pub const GAZE_STREAM: &str = "gaze";
pub const OBJECT_STREAM: &str = "objects";

pub struct DetectionFanout {
    landmarks: Arc<dyn LandmarkEstimator>,
    detector: Arc<dyn ObjectDetector>,
    filter: Arc<RwLock<ObjectFilter>>,
}

impl DetectionFanout {
    pub fn new(
        landmarks: Arc<dyn LandmarkEstimator>,
        detector: Arc<dyn ObjectDetector>,
        filter: ObjectFilter,
    ) -> Self {
        Self {
            landmarks,
            detector,
            filter: Arc::new(RwLock::new(filter)),
        }
    }

    pub fn filter(&self) -> &RwLock<ObjectFilter> {
        &self.filter
    }

    pub fn landmark_model(&self) -> String {
        self.landmarks.model_name()
    }

    pub fn object_model(&self) -> String {
        self.detector.model_name()
    }

    /// Run both streams and merge them into one bundle.
    ///
    /// `full_frame` goes to the object detector untouched; the conditioned
    /// (and possibly cropped) frame goes to the landmark estimator.
    pub async fn dispatch(
        &self,
        full_frame: Arc<RgbImage>,
        conditioned: ConditionedFrame,
        tracker: Arc<Mutex<GazeTracker>>,
        timestamp: f64,
    ) -> DetectionBundle {
        let ConditionedFrame { image: gaze_frame, roi } = conditioned;

        let estimator = self.landmarks.clone();
        let gaze_task = tokio::spawn(async move {
            let landmarks = estimator.estimate(&gaze_frame).await?;
            let (width, height) = gaze_frame.dimensions();
            let reading = tracker
                .lock()
                .update(landmarks.as_ref(), width, height, timestamp);
            Ok::<_, ProctorError>(reading)
        });

        let detector = self.detector.clone();
        let filter = self.filter.clone();
        let object_task = tokio::spawn(async move {
            let detections = detector.detect(&full_frame).await?;
            Ok::<_, ProctorError>(filter.read().classify(&detections))
        });

        let (gaze_result, object_result) = tokio::join!(gaze_task, object_task);

        let mut degraded_streams = Vec::new();
        let gaze = settle(gaze_result, GAZE_STREAM, &mut degraded_streams)
            .unwrap_or_else(GazeReading::no_face);
        let objects = settle(object_result, OBJECT_STREAM, &mut degraded_streams)
            .unwrap_or_default();

        let gaze = rescale_to_frame(gaze, &roi);

        debug!(
            "Detections at {:.3}: face={} deviation={} persons={} forbidden={}",
            timestamp,
            gaze.face_detected,
            gaze.deviation,
            objects.person_count,
            objects.forbidden_items.len()
        );

        DetectionBundle {
            gaze,
            objects,
            timestamp,
            degraded_streams,
        }
    }
}

/// Unwrap one branch, recording the stream as degraded on any fault
fn settle<T>(
    result: Result<Result<T, ProctorError>, JoinError>,
    stream: &'static str,
    degraded: &mut Vec<String>,
) -> Option<T> {
    let failure = match result {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(e)) => e.to_string(),
        Err(e) if e.is_panic() => "detector task panicked".to_string(),
        Err(e) => e.to_string(),
    };

    warn!("{} detection failed, substituting default: {}", stream, failure);
    counter!("argus_detector_failures_total", "stream" => stream).increment(1);
    degraded.push(stream.to_string());
    None
}

/// Map ROI-local gaze boxes back to full-frame coordinates
fn rescale_to_frame(mut gaze: GazeReading, roi: &RoiInfo) -> GazeReading {
    if !roi.enabled || !gaze.face_detected {
        return gaze;
    }

    let ratio = roi.reduction_ratio;
    gaze.face_box = gaze.face_box.map(|b| b.scale_vertical(ratio));
    gaze.left_eye = gaze.left_eye.map(|b| b.scale_vertical(ratio));
    gaze.right_eye = gaze.right_eye.map(|b| b.scale_vertical(ratio));
    gaze
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::BoundingBox;

    #[test]
    fn test_rescale_only_when_roi_enabled() {
        let gaze = GazeReading {
            face_detected: true,
            face_box: Some(BoundingBox::new(0.1, 0.5, 0.2, 0.4)),
            ..GazeReading::default()
        };

        let disabled = RoiInfo {
            reduction_ratio: 1.0,
            ..RoiInfo::default()
        };
        assert_eq!(rescale_to_frame(gaze.clone(), &disabled), gaze);

        let enabled = RoiInfo {
            enabled: true,
            reduction_ratio: 0.5,
            ..RoiInfo::default()
        };
        let rescaled = rescale_to_frame(gaze, &enabled);
        assert_eq!(rescaled.face_box, Some(BoundingBox::new(0.1, 0.25, 0.2, 0.2)));
    }

    #[test]
    fn test_settle_records_degraded_stream() {
        let mut degraded = Vec::new();
        let ok: Option<u32> = settle(Ok(Ok(7)), GAZE_STREAM, &mut degraded);
        assert_eq!(ok, Some(7));
        assert!(degraded.is_empty());

        let failed: Option<u32> = settle(
            Ok(Err(ProctorError::detector(OBJECT_STREAM, "offline"))),
            OBJECT_STREAM,
            &mut degraded,
        );
        assert!(failed.is_none());
        assert_eq!(degraded, vec![OBJECT_STREAM.to_string()]);
    }
}
