//! Per-frame readings and session reports

use crate::config::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque session key supplied by the transport
pub type SessionId = String;

/// Axis-aligned box as (x, y, width, height).
///
/// Gaze boxes are normalized to the frame the landmark estimator saw;
/// object boxes are in pixels of the full frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Build from corner coordinates, normalizing inverted corners
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    /// Map a box from a top-anchored crop back to the full frame
    pub fn scale_vertical(&self, ratio: f64) -> Self {
        Self {
            x: self.x,
            y: self.y * ratio,
            width: self.width,
            height: self.height * ratio,
        }
    }
}

/// Output of the gaze stream for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeReading {
    pub face_detected: bool,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    /// Sustained screen deviation
    pub deviation: bool,
    pub minor_deviation: bool,
    pub deviation_duration: f64,
    pub deviation_consistency: f64,
    pub confidence: f64,
    pub landmarks_count: usize,
    pub face_box: Option<BoundingBox>,
    pub left_eye: Option<BoundingBox>,
    pub right_eye: Option<BoundingBox>,
}

impl GazeReading {
    /// Neutral reading used when no face is present or the stream failed
    pub fn no_face() -> Self {
        Self::default()
    }
}

/// A detected item from the forbidden-class table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForbiddenItem {
    /// Display label, e.g. "phone"
    pub object: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    /// Raw detector class name
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Output of the object stream for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectReading {
    pub person_count: u32,
    pub forbidden_items: Vec<ForbiddenItem>,
    pub all_detections: Vec<Detection>,
    /// Mean confidence over retained detections
    pub confidence: f64,
}

/// Merged output of both detection streams for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionBundle {
    pub gaze: GazeReading,
    pub objects: ObjectReading,
    pub timestamp: f64,
    /// Streams whose detector faulted and were replaced by defaults
    pub degraded_streams: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSummary {
    pub pattern_score: f64,
    pub repeated_deviations: usize,
    pub repeated_objects: usize,
    pub avg_person_count: f64,
    pub window_frames: usize,
    pub summary: String,
}

impl BehaviorSummary {
    pub fn with_note(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Skipped frames only
    None,
    Low,
    Medium,
    High,
    Critical,
    /// Failed frames only
    Error,
}

impl AlertLevel {
    /// Map a clamped risk score onto the scored tiers
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            AlertLevel::Critical
        } else if score >= 50.0 {
            AlertLevel::High
        } else if score >= 20.0 {
            AlertLevel::Medium
        } else {
            AlertLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::None => "none",
            AlertLevel::Low => "low",
            AlertLevel::Medium => "medium",
            AlertLevel::High => "high",
            AlertLevel::Critical => "critical",
            AlertLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-contribution breakdown of a risk score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskDetails {
    pub base_score: f64,
    pub screen_deviation_contribution: f64,
    pub screen_deviation_duration: f64,
    pub object_contribution: f64,
    pub person_contribution: f64,
    pub behavior_contribution: f64,
    pub multiplier_applied: bool,
    pub person_count: u32,
    pub forbidden_items_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub violation_count: usize,
    pub violations: Vec<String>,
    pub alert_level: AlertLevel,
    pub recommendations: Vec<String>,
    pub details: RiskDetails,
}

impl RiskAssessment {
    /// Assessment attached to frames the admission controller skipped
    pub fn skipped() -> Self {
        Self {
            risk_score: 0.0,
            violation_count: 0,
            violations: Vec::new(),
            alert_level: AlertLevel::None,
            recommendations: Vec::new(),
            details: RiskDetails::default(),
        }
    }

    /// Assessment attached to frames that hit a pipeline failure
    pub fn failed() -> Self {
        Self {
            alert_level: AlertLevel::Error,
            recommendations: vec!["System error - review logs".to_string()],
            ..Self::skipped()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionReason {
    FirstFrame,
    MotionDetected,
    MinFpsInterval,
    SamplingDisabled,
}

/// Admission controller report for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingInfo {
    pub enabled: bool,
    pub motion_score: f64,
    pub motion_detected: bool,
    /// `None` when the frame was skipped
    pub reason: Option<AdmissionReason>,
    pub frame_number: u64,
    pub processed_count: u64,
    pub skip_ratio: f64,
    pub time_since_last: f64,
}

/// Region-of-interest crop applied to the gaze stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiInfo {
    pub enabled: bool,
    pub original_size: (u32, u32),
    pub roi_size: (u32, u32),
    pub offset: (u32, u32),
    /// ROI height over full height; 1.0 when disabled
    pub reduction_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCounters {
    pub total_frames: u64,
    pub processed_frames: u64,
    pub skipped_frames: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub session_id: SessionId,
    pub timestamp: f64,
    pub frame_skipped: bool,
    pub processing_time_ms: f64,
    pub preprocessing_time_ms: f64,
    pub detection_time_ms: f64,
    pub avg_processing_time_ms: f64,
    pub avg_preprocessing_time_ms: f64,
    pub frame_within_timeout: bool,
    pub conditioning_enabled: bool,
    pub degraded_streams: Vec<String>,
    pub roi: Option<RoiInfo>,
    pub sampling: SamplingInfo,
    pub performance: PerformanceCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete per-frame result: `{gaze, objects, behavior, risk, metadata}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub gaze: GazeReading,
    pub objects: ObjectReading,
    pub behavior: BehaviorSummary,
    pub risk: RiskAssessment,
    pub metadata: FrameMetadata,
}

impl FrameAnalysis {
    pub fn is_skipped(&self) -> bool {
        self.metadata.frame_skipped
    }

    pub fn is_error(&self) -> bool {
        self.risk.alert_level == AlertLevel::Error
    }
}

/// Lifetime totals for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total_frames_analyzed: u64,
    pub total_gaze_deviations: u64,
    pub total_object_detections: u64,
    pub avg_person_count: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPerformance {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub avg_processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub behavior_statistics: SessionStatistics,
    pub scoring_config: ScoringConfig,
    pub performance: SessionPerformance,
}

/// Object stream thresholds and class table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectModelInfo {
    pub model: String,
    pub detection_confidence: f64,
    pub person_confidence: f64,
    pub forbidden_classes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub gaze_detector: String,
    pub object_detector: ObjectModelInfo,
    pub window_size: usize,
    pub active_sessions: usize,
    pub scoring_config: ScoringConfig,
    pub avg_processing_time_ms: f64,
    pub target_fps: u32,
    pub timeout_ms: f64,
    pub conditioning_enabled: bool,
    pub sampling_enabled: bool,
}
