//! Configuration for argus
//!
//! Every analytics stage receives its own section at construction time.
//! A full [`ProctorConfig`] can be loaded from JSON, TOML, or YAML and
//! overridden from `ARGUS_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Head-pose thresholds and hysteresis parameters for the gaze tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// "Looking away slightly" yaw threshold (degrees)
    pub minor_yaw_threshold: f64,
    /// "Looking away slightly" pitch threshold (degrees)
    pub minor_pitch_threshold: f64,
    /// "Looking at another screen" yaw threshold (degrees)
    pub screen_yaw_threshold: f64,
    /// "Looking at another screen" pitch threshold (degrees)
    pub screen_pitch_threshold: f64,
    /// Moving-average and consistency window length (frames)
    pub smoothing_window: usize,
    /// Fraction of deviating frames required for sustained deviation
    pub consistency_threshold: f64,
    /// Seconds of normal gaze required before the deviation timer resets
    pub grace_period_secs: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            minor_yaw_threshold: 30.0,
            minor_pitch_threshold: 25.0,
            screen_yaw_threshold: 45.0,
            screen_pitch_threshold: 35.0,
            smoothing_window: 5,
            consistency_threshold: 0.6,
            grace_period_secs: 1.5,
        }
    }
}

/// Weights and duration tiers used by the risk scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub min_deviation_secs: f64,
    pub extended_deviation_secs: f64,
    pub critical_deviation_secs: f64,
    pub screen_deviation_base_weight: f64,
    pub screen_deviation_extended_weight: f64,
    pub screen_deviation_critical_weight: f64,
    pub forbidden_object_weight: f64,
    pub secondary_person_weight: f64,
    /// Applied to the base score when two or more violation types co-occur
    pub multiple_violations_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_deviation_secs: 3.0,
            extended_deviation_secs: 10.0,
            critical_deviation_secs: 20.0,
            screen_deviation_base_weight: 50.0,
            screen_deviation_extended_weight: 70.0,
            screen_deviation_critical_weight: 90.0,
            forbidden_object_weight: 70.0,
            secondary_person_weight: 60.0,
            multiple_violations_multiplier: 1.3,
        }
    }
}

/// Confidence floors and forbidden-class table for the object stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    /// Detections below this confidence are discarded entirely
    pub detection_confidence: f64,
    /// Persons are only counted strictly above this confidence
    pub person_confidence: f64,
    pub person_label: String,
    /// Detector class name -> reported label
    pub forbidden_classes: BTreeMap<String, String>,
    /// Cap on detections retained per frame (highest confidence kept)
    pub max_detections: usize,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        let forbidden_classes = [
            ("cell phone", "phone"),
            ("phone", "phone"),
            ("book", "book"),
            ("laptop", "laptop"),
        ]
        .into_iter()
        .map(|(class, label)| (class.to_string(), label.to_string()))
        .collect();

        Self {
            detection_confidence: 0.25,
            person_confidence: 0.5,
            person_label: "person".to_string(),
            forbidden_classes,
            max_detections: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Sliding window capacity (frames)
    pub window_size: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self { window_size: 200 }
    }
}

/// Motion-based adaptive sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub enabled: bool,
    /// Mean absolute grey-level difference that counts as motion
    pub motion_threshold: f64,
    /// Floor sampling rate, applied regardless of motion
    pub min_fps: f64,
    /// Ceiling sampling rate while motion is present
    pub max_fps: f64,
    /// Gaussian kernel size used before differencing (odd)
    pub blur_kernel: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            motion_threshold: 10.0,
            min_fps: 2.0,
            max_fps: 10.0,
            blur_kernel: 9,
        }
    }
}

/// Image conditioning chain and region-of-interest crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    pub enabled: bool,
    pub gamma_enabled: bool,
    pub gamma: f64,
    pub bilateral_enabled: bool,
    pub bilateral_diameter: u32,
    pub bilateral_sigma_color: f64,
    pub bilateral_sigma_space: f64,
    pub clahe_enabled: bool,
    pub clahe_clip_limit: f64,
    /// Tile grid is `clahe_tiles x clahe_tiles`
    pub clahe_tiles: u32,
    pub roi_enabled: bool,
    /// Top fraction of the frame kept for the gaze stream
    pub roi_ratio: f64,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gamma_enabled: false,
            gamma: 1.2,
            bilateral_enabled: true,
            bilateral_diameter: 5,
            bilateral_sigma_color: 50.0,
            bilateral_sigma_space: 50.0,
            clahe_enabled: true,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            roi_enabled: false,
            roi_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_fps: u32,
    /// Soft per-frame budget; exceeding it is reported, never enforced
    pub frame_timeout_secs: f64,
    pub max_sessions: usize,
    /// Number of processing-time samples kept for rolling averages
    pub stats_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 20,
            frame_timeout_secs: 5.0,
            max_sessions: 10,
            stats_window: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Concurrent WebSocket connections accepted
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            max_connections: 100,
        }
    }
}

/// External model endpoints. `None` selects the disabled backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub landmark_endpoint: Option<String>,
    pub object_endpoint: Option<String>,
    pub request_timeout_ms: u64,
    pub landmark_model: String,
    pub object_model: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            landmark_endpoint: None,
            object_endpoint: None,
            request_timeout_ms: 2000,
            landmark_model: "face-mesh+pnp".to_string(),
            object_model: "yolov8m".to_string(),
        }
    }
}

/// Complete process configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub gaze: GazeConfig,
    pub scoring: ScoringConfig,
    pub objects: ObjectConfig,
    pub behavior: BehaviorConfig,
    pub sampling: SamplingConfig,
    pub conditioning: ConditioningConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub detectors: DetectorConfig,
}

impl ProctorConfig {
    /// Load configuration from a JSON, TOML, or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        if display.contains("..") {
            return Err(ConfigError::Io(format!(
                "Path traversal detected: '{}'",
                display
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            _ => Self::from_str(&content),
        }
    }

    /// Parse configuration content of unknown format
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<ProctorConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<ProctorConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<ProctorConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::Parse("Unknown format".to_string()))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override selected keys from `ARGUS_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("ARGUS_HOST") {
            self.server.host = host;
        }

        if let Some(port) = env_parse::<u16>("ARGUS_PORT") {
            self.server.port = port;
        }

        if let Some(window) = env_parse::<usize>("ARGUS_WINDOW_SIZE") {
            self.behavior.window_size = window;
        }

        if let Some(max_sessions) = env_parse::<usize>("ARGUS_MAX_SESSIONS") {
            self.pipeline.max_sessions = max_sessions;
        }

        if let Ok(endpoint) = std::env::var("ARGUS_LANDMARK_ENDPOINT") {
            self.detectors.landmark_endpoint = Some(endpoint);
        }

        if let Ok(endpoint) = std::env::var("ARGUS_OBJECT_ENDPOINT") {
            self.detectors.object_endpoint = Some(endpoint);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gaze = &self.gaze;
        if gaze.minor_yaw_threshold <= 0.0 || gaze.minor_pitch_threshold <= 0.0 {
            return Err(ConfigError::Validation(
                "Minor deviation thresholds must be positive".to_string(),
            ));
        }
        if gaze.minor_yaw_threshold > gaze.screen_yaw_threshold
            || gaze.minor_pitch_threshold > gaze.screen_pitch_threshold
        {
            return Err(ConfigError::Validation(
                "Minor deviation thresholds cannot exceed screen deviation thresholds".to_string(),
            ));
        }
        if gaze.smoothing_window == 0 {
            return Err(ConfigError::Validation(
                "Gaze smoothing window must be at least 1 frame".to_string(),
            ));
        }
        check_unit("gaze.consistency_threshold", gaze.consistency_threshold)?;
        if gaze.grace_period_secs < 0.0 {
            return Err(ConfigError::Validation(
                "Grace period cannot be negative".to_string(),
            ));
        }

        let scoring = &self.scoring;
        if !(scoring.min_deviation_secs < scoring.extended_deviation_secs
            && scoring.extended_deviation_secs < scoring.critical_deviation_secs)
        {
            return Err(ConfigError::Validation(
                "Deviation duration tiers must be strictly increasing".to_string(),
            ));
        }
        if scoring.multiple_violations_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "Multiple violations multiplier must be at least 1.0".to_string(),
            ));
        }
        let weights = [
            scoring.screen_deviation_base_weight,
            scoring.screen_deviation_extended_weight,
            scoring.screen_deviation_critical_weight,
            scoring.forbidden_object_weight,
            scoring.secondary_person_weight,
        ];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(ConfigError::Validation(
                "Scoring weights cannot be negative".to_string(),
            ));
        }

        check_unit("objects.detection_confidence", self.objects.detection_confidence)?;
        check_unit("objects.person_confidence", self.objects.person_confidence)?;
        if self.objects.max_detections == 0 {
            return Err(ConfigError::Validation(
                "max_detections must be at least 1".to_string(),
            ));
        }

        if self.behavior.window_size == 0 {
            return Err(ConfigError::Validation(
                "Behavior window size must be at least 1 frame".to_string(),
            ));
        }

        let sampling = &self.sampling;
        if sampling.min_fps <= 0.0 || sampling.max_fps <= 0.0 {
            return Err(ConfigError::Validation(
                "Sampling rates must be positive".to_string(),
            ));
        }
        if sampling.min_fps > sampling.max_fps {
            return Err(ConfigError::Validation(
                "min_fps cannot exceed max_fps".to_string(),
            ));
        }
        if sampling.blur_kernel == 0 || sampling.blur_kernel % 2 == 0 {
            return Err(ConfigError::Validation(
                "Blur kernel must be a positive odd number".to_string(),
            ));
        }

        let conditioning = &self.conditioning;
        if conditioning.gamma <= 0.0 {
            return Err(ConfigError::Validation("Gamma must be positive".to_string()));
        }
        if conditioning.roi_ratio <= 0.0 || conditioning.roi_ratio > 1.0 {
            return Err(ConfigError::Validation(
                "ROI ratio must be in (0, 1]".to_string(),
            ));
        }
        if conditioning.clahe_tiles == 0 || conditioning.clahe_clip_limit <= 0.0 {
            return Err(ConfigError::Validation(
                "CLAHE tiles and clip limit must be positive".to_string(),
            ));
        }

        if self.pipeline.target_fps == 0 || self.pipeline.frame_timeout_secs <= 0.0 {
            return Err(ConfigError::Validation(
                "Target fps and frame timeout must be positive".to_string(),
            ));
        }
        if self.pipeline.max_sessions == 0 || self.pipeline.stats_window == 0 {
            return Err(ConfigError::Validation(
                "max_sessions and stats_window must be at least 1".to_string(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(ConfigError::Validation(
                "Server must accept at least one connection".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProctorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_forbidden_classes() {
        let objects = ObjectConfig::default();
        assert_eq!(objects.forbidden_classes.get("cell phone").map(String::as_str), Some("phone"));
        assert_eq!(objects.forbidden_classes.get("laptop").map(String::as_str), Some("laptop"));
        assert!(!objects.forbidden_classes.contains_key("person"));
    }

    #[test]
    fn test_validation_rejects_inverted_thresholds() {
        let mut config = ProctorConfig::default();
        config.gaze.minor_yaw_threshold = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_tiers() {
        let mut config = ProctorConfig::default();
        config.scoring.extended_deviation_secs = 25.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_sampling() {
        let mut config = ProctorConfig::default();
        config.sampling.min_fps = 20.0;
        assert!(config.validate().is_err());

        config = ProctorConfig::default();
        config.sampling.blur_kernel = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let mut config = ProctorConfig::default();
        config.behavior.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_confidence_out_of_range() {
        let mut config = ProctorConfig::default();
        config.objects.person_confidence = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_roi_ratio_bounds() {
        let mut config = ProctorConfig::default();
        config.conditioning.roi_ratio = 1.0;
        assert!(config.validate().is_ok());
        config.conditioning.roi_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let content = r#"
[behavior]
window_size = 50

[server]
port = 9100
"#;
        let config = ProctorConfig::from_str(content).unwrap();
        assert_eq!(config.behavior.window_size, 50);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.gaze.smoothing_window, 5);
    }

    #[test]
    fn test_partial_yaml() {
        let content = "gaze:\n  grace_period_secs: 2.5\n";
        let config = ProctorConfig::from_str(content).unwrap();
        assert_eq!(config.gaze.grace_period_secs, 2.5);
        assert_eq!(config.gaze.consistency_threshold, 0.6);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus.toml");
        std::fs::write(&path, "[pipeline]\nmax_sessions = 3\n").unwrap();
        let config = ProctorConfig::from_file(&path).unwrap();
        assert_eq!(config.pipeline.max_sessions, 3);
    }

    #[test]
    fn test_from_file_rejects_traversal() {
        let result = ProctorConfig::from_file("../secrets/argus.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_from_file_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ProctorConfig::from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
