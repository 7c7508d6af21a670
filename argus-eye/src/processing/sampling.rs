//! Motion-based frame admission
//!
//! Frames are admitted when the scene moved and the ceiling rate allows
//! it, or unconditionally once the floor interval has elapsed. Skipped
//! frames never reach a detector.

use argus_core::{AdmissionReason, SamplingConfig, SamplingInfo};
use image::{imageops, GrayImage, RgbImage};

/// Outcome of [`FrameSampler::evaluate`]
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    pub admit: bool,
    pub info: SamplingInfo,
}

/// Per-session admission controller
pub struct FrameSampler {
    config: SamplingConfig,
    blur_sigma: f32,
    previous: Option<GrayImage>,
    last_admitted: Option<f64>,
    frame_count: u64,
    processed_count: u64,
}

impl FrameSampler {
    pub fn new(config: SamplingConfig) -> Self {
        let blur_sigma = kernel_sigma(config.blur_kernel);
        Self {
            config,
            blur_sigma,
            previous: None,
            last_admitted: None,
            frame_count: 0,
            processed_count: 0,
        }
    }

    /// Decide whether `frame`, captured at `timestamp` seconds, is processed
    pub fn evaluate(&mut self, frame: &RgbImage, timestamp: f64) -> AdmissionDecision {
        self.frame_count += 1;

        if !self.config.enabled {
            self.processed_count += 1;
            return AdmissionDecision {
                admit: true,
                info: self.info(0.0, false, Some(AdmissionReason::SamplingDisabled), 0.0),
            };
        }

        let current = self.prepare(frame);

        let Some(last_admitted) = self.last_admitted.filter(|_| self.previous.is_some()) else {
            self.admit(current, timestamp);
            return AdmissionDecision {
                admit: true,
                info: self.info(0.0, false, Some(AdmissionReason::FirstFrame), 0.0),
            };
        };

        let motion_score = self
            .previous
            .as_ref()
            .map_or(255.0, |previous| motion_score(previous, &current));
        let motion_detected = motion_score > self.config.motion_threshold;
        let elapsed = timestamp - last_admitted;

        let reason = if motion_detected && elapsed >= 1.0 / self.config.max_fps {
            Some(AdmissionReason::MotionDetected)
        } else if elapsed >= 1.0 / self.config.min_fps {
            Some(AdmissionReason::MinFpsInterval)
        } else {
            None
        };

        let admit = reason.is_some();
        if admit {
            self.admit(current, timestamp);
        }

        AdmissionDecision {
            admit,
            info: self.info(motion_score, motion_detected, reason, elapsed),
        }
    }

    /// Forget the reference frame and counters
    pub fn reset(&mut self) {
        self.previous = None;
        self.last_admitted = None;
        self.frame_count = 0;
        self.processed_count = 0;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    fn prepare(&self, frame: &RgbImage) -> GrayImage {
        let gray = imageops::grayscale(frame);
        imageops::blur(&gray, self.blur_sigma)
    }

    fn admit(&mut self, frame: GrayImage, timestamp: f64) {
        self.previous = Some(frame);
        self.last_admitted = Some(timestamp);
        self.processed_count += 1;
    }

    fn info(
        &self,
        motion_score: f64,
        motion_detected: bool,
        reason: Option<AdmissionReason>,
        time_since_last: f64,
    ) -> SamplingInfo {
        let skip_ratio = if self.frame_count == 0 {
            0.0
        } else {
            1.0 - self.processed_count as f64 / self.frame_count as f64
        };

        SamplingInfo {
            enabled: self.config.enabled,
            motion_score,
            motion_detected,
            reason,
            frame_number: self.frame_count,
            processed_count: self.processed_count,
            skip_ratio,
            time_since_last,
        }
    }
}

/// Gaussian sigma matching a square kernel of the given size
fn kernel_sigma(kernel: u32) -> f32 {
    0.3 * ((kernel.max(1) as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Mean absolute grey-level difference; a resolution change is full motion
fn motion_score(previous: &GrayImage, current: &GrayImage) -> f64 {
    if previous.dimensions() != current.dimensions() {
        return 255.0;
    }

    let pixels = current.as_raw().len();
    if pixels == 0 {
        return 0.0;
    }

    let total: u64 = previous
        .as_raw()
        .iter()
        .zip(current.as_raw())
        .map(|(a, b)| (*a as i16 - *b as i16).unsigned_abs() as u64)
        .sum();

    total as f64 / pixels as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(32, 24, Rgb([value, value, value]))
    }

    #[test]
    fn test_first_frame_always_admitted() {
        let mut sampler = FrameSampler::new(SamplingConfig::default());
        let decision = sampler.evaluate(&solid(0), 100.0);
        assert!(decision.admit);
        assert_eq!(decision.info.reason, Some(AdmissionReason::FirstFrame));
        assert_eq!(decision.info.frame_number, 1);
    }

    #[test]
    fn test_static_scene_skipped_until_floor_interval() {
        let mut sampler = FrameSampler::new(SamplingConfig::default());
        sampler.evaluate(&solid(50), 0.0);

        let decision = sampler.evaluate(&solid(50), 0.2);
        assert!(!decision.admit);
        assert_eq!(decision.info.reason, None);
        assert!(!decision.info.motion_detected);

        let decision = sampler.evaluate(&solid(50), 0.5);
        assert!(decision.admit);
        assert_eq!(decision.info.reason, Some(AdmissionReason::MinFpsInterval));
    }

    #[test]
    fn test_motion_respects_ceiling_rate() {
        let mut sampler = FrameSampler::new(SamplingConfig::default());
        sampler.evaluate(&solid(0), 0.0);

        // Motion but faster than max_fps allows
        let decision = sampler.evaluate(&solid(200), 0.05);
        assert!(decision.info.motion_detected);
        assert!(!decision.admit);

        let decision = sampler.evaluate(&solid(200), 0.1);
        assert!(decision.admit);
        assert_eq!(decision.info.reason, Some(AdmissionReason::MotionDetected));
        assert!(decision.info.motion_score > 100.0);
    }

    #[test]
    fn test_skipped_frame_does_not_replace_reference() {
        let mut sampler = FrameSampler::new(SamplingConfig::default());
        sampler.evaluate(&solid(0), 0.0);
        sampler.evaluate(&solid(200), 0.01);
        // Reference is still the black frame, so motion is still measured against it
        let decision = sampler.evaluate(&solid(200), 0.2);
        assert!(decision.admit);
        assert_eq!(decision.info.reason, Some(AdmissionReason::MotionDetected));
    }

    #[test]
    fn test_skip_ratio_and_counts() {
        let mut sampler = FrameSampler::new(SamplingConfig::default());
        sampler.evaluate(&solid(10), 0.0);
        sampler.evaluate(&solid(10), 0.1);
        sampler.evaluate(&solid(10), 0.2);
        let decision = sampler.evaluate(&solid(10), 0.3);
        assert_eq!(decision.info.frame_number, 4);
        assert_eq!(decision.info.processed_count, 1);
        assert!((decision.info.skip_ratio - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_sampling_admits_everything() {
        let config = SamplingConfig {
            enabled: false,
            ..SamplingConfig::default()
        };
        let mut sampler = FrameSampler::new(config);
        for i in 0..5 {
            let decision = sampler.evaluate(&solid(10), i as f64 * 0.001);
            assert!(decision.admit);
            assert_eq!(decision.info.reason, Some(AdmissionReason::SamplingDisabled));
        }
    }

    #[test]
    fn test_resolution_change_counts_as_motion() {
        let mut sampler = FrameSampler::new(SamplingConfig::default());
        sampler.evaluate(&solid(10), 0.0);
        let larger = RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]));
        let decision = sampler.evaluate(&larger, 0.2);
        assert!(decision.info.motion_detected);
        assert!(decision.admit);
    }

    #[test]
    fn test_reset_makes_next_frame_first() {
        let mut sampler = FrameSampler::new(SamplingConfig::default());
        sampler.evaluate(&solid(10), 0.0);
        sampler.reset();
        let decision = sampler.evaluate(&solid(10), 0.01);
        assert_eq!(decision.info.reason, Some(AdmissionReason::FirstFrame));
        assert_eq!(sampler.frame_count(), 1);
    }

    #[test]
    fn test_kernel_sigma_matches_nine_tap() {
        assert!((kernel_sigma(9) - 1.7).abs() < 1e-6);
    }
}
