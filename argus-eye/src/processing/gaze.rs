//! Gaze deviation tracking
//!
//! Turns noisy per-frame head-pose angles into a debounced
//! "looking at another screen" signal with a duration:
//!
//! 1. yaw/pitch are smoothed by a trailing moving average
//! 2. each frame is classified against the minor and screen tiers
//! 3. screen flags feed a consistency window; only a window at or above
//!    the consistency threshold counts as sustained deviation
//! 4. a three-state timer (idle, deviating, grace) tracks how long the
//!    sustained deviation has lasted, tolerating short returns to normal
//!
//! All times are frame capture timestamps in seconds.

use super::head_pose::{HeadPose, HeadPoseSolver};
use super::window::BoundedWindow;
use crate::models::FaceLandmarks;
use argus_core::{BoundingBox, GazeConfig, GazeReading};

/// Confidence reported for every frame with a detected face
const FACE_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviationState {
    Idle,
    Deviating,
    Grace,
}

/// Duration timer with a grace period before reset
#[derive(Debug, Clone)]
pub struct DeviationTimer {
    grace_period: f64,
    started_at: Option<f64>,
    normal_since: Option<f64>,
    duration: f64,
}

impl DeviationTimer {
    pub fn new(grace_period: f64) -> Self {
        Self {
            grace_period,
            started_at: None,
            normal_since: None,
            duration: 0.0,
        }
    }

    pub fn state(&self) -> DeviationState {
        match (self.started_at, self.normal_since) {
            (None, _) => DeviationState::Idle,
            (Some(_), None) => DeviationState::Deviating,
            (Some(_), Some(_)) => DeviationState::Grace,
        }
    }

    /// Feed one sustained-deviation sample and return the current duration
    pub fn observe(&mut self, sustained: bool, now: f64) -> f64 {
        match (sustained, self.started_at) {
            (true, None) => {
                self.started_at = Some(now);
                self.normal_since = None;
                self.duration = 0.0;
            }
            (true, Some(start)) => {
                self.normal_since = None;
                self.duration = self.duration.max(now - start);
            }
            (false, Some(start)) => {
                let normal_since = *self.normal_since.get_or_insert(now);
                if now - normal_since >= self.grace_period {
                    self.reset();
                } else {
                    self.duration = self.duration.max(now - start);
                }
            }
            (false, None) => {
                self.duration = 0.0;
            }
        }
        self.duration
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn reset(&mut self) {
        self.started_at = None;
        self.normal_since = None;
        self.duration = 0.0;
    }
}

/// Per-session gaze tracker
pub struct GazeTracker {
    config: GazeConfig,
    solver: HeadPoseSolver,
    yaw_history: BoundedWindow<f64>,
    pitch_history: BoundedWindow<f64>,
    deviation_history: BoundedWindow<bool>,
    face_boxes: BoundedWindow<BoundingBox>,
    left_eye_boxes: BoundedWindow<BoundingBox>,
    right_eye_boxes: BoundedWindow<BoundingBox>,
    timer: DeviationTimer,
}

impl GazeTracker {
    pub fn new(config: GazeConfig) -> Self {
        let window = config.smoothing_window;
        Self {
            solver: HeadPoseSolver::new(),
            yaw_history: BoundedWindow::new(window),
            pitch_history: BoundedWindow::new(window),
            deviation_history: BoundedWindow::new(window),
            face_boxes: BoundedWindow::new(window),
            left_eye_boxes: BoundedWindow::new(window),
            right_eye_boxes: BoundedWindow::new(window),
            timer: DeviationTimer::new(config.grace_period_secs),
            config,
        }
    }

    /// Process the estimator output for one frame of `width` x `height`
    pub fn update(
        &mut self,
        landmarks: Option<&FaceLandmarks>,
        width: u32,
        height: u32,
        timestamp: f64,
    ) -> GazeReading {
        let Some(landmarks) = landmarks else {
            self.timer.reset();
            return GazeReading::no_face();
        };

        // A degenerate solve still counts as a detected face
        let pose = self
            .solver
            .solve(landmarks, width, height)
            .unwrap_or_default();

        let mut reading = self.advance(pose, timestamp);
        reading.landmarks_count = if landmarks.landmark_count > 0 {
            landmarks.landmark_count
        } else {
            landmarks.points().len()
        };
        reading.face_box = smoothed_box(&mut self.face_boxes, landmarks.face_box);
        reading.left_eye = smoothed_box(&mut self.left_eye_boxes, landmarks.left_eye);
        reading.right_eye = smoothed_box(&mut self.right_eye_boxes, landmarks.right_eye);
        reading
    }

    /// Advance the tracker with an already-solved head pose
    pub fn advance(&mut self, pose: HeadPose, timestamp: f64) -> GazeReading {
        self.yaw_history.push(pose.yaw);
        self.pitch_history.push(pose.pitch);
        let yaw = self.yaw_history.mean();
        let pitch = self.pitch_history.mean();

        let minor_deviation = yaw.abs() > self.config.minor_yaw_threshold
            || pitch.abs() > self.config.minor_pitch_threshold;
        let screen_deviation = yaw.abs() > self.config.screen_yaw_threshold
            || pitch.abs() > self.config.screen_pitch_threshold;

        self.deviation_history.push(screen_deviation);
        let consistency = self.deviation_history.true_fraction();
        let sustained = consistency >= self.config.consistency_threshold;

        let deviation_duration = self.timer.observe(sustained, timestamp);

        GazeReading {
            face_detected: true,
            yaw,
            pitch,
            roll: pose.roll,
            deviation: sustained,
            minor_deviation,
            deviation_duration,
            deviation_consistency: consistency,
            confidence: FACE_CONFIDENCE,
            landmarks_count: 0,
            face_box: None,
            left_eye: None,
            right_eye: None,
        }
    }

    pub fn state(&self) -> DeviationState {
        self.timer.state()
    }

    pub fn deviation_duration(&self) -> f64 {
        self.timer.duration()
    }

    /// Clear the timer and every history window
    pub fn reset(&mut self) {
        self.timer.reset();
        self.yaw_history.clear();
        self.pitch_history.clear();
        self.deviation_history.clear();
        self.face_boxes.clear();
        self.left_eye_boxes.clear();
        self.right_eye_boxes.clear();
    }
}

fn smoothed_box(
    history: &mut BoundedWindow<BoundingBox>,
    current: Option<BoundingBox>,
) -> Option<BoundingBox> {
    history.push(current?);
    let n = history.len() as f64;
    let sum = history.iter().fold(BoundingBox::default(), |acc, b| {
        BoundingBox::new(acc.x + b.x, acc.y + b.y, acc.width + b.width, acc.height + b.height)
    });
    Some(BoundingBox::new(sum.x / n, sum.y / n, sum.width / n, sum.height / n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn looking_away() -> HeadPose {
        HeadPose { yaw: 60.0, pitch: 0.0, roll: 0.0 }
    }

    fn looking_ahead() -> HeadPose {
        HeadPose::default()
    }

    /// Tracker with no smoothing so each frame is classified on its own
    fn unsmoothed() -> GazeTracker {
        GazeTracker::new(GazeConfig {
            smoothing_window: 1,
            ..GazeConfig::default()
        })
    }

    #[test]
    fn test_timer_idle_to_deviating() {
        let mut timer = DeviationTimer::new(1.5);
        assert_eq!(timer.state(), DeviationState::Idle);
        assert_eq!(timer.observe(true, 10.0), 0.0);
        assert_eq!(timer.state(), DeviationState::Deviating);
        assert_eq!(timer.observe(true, 12.5), 2.5);
    }

    #[test]
    fn test_timer_grace_keeps_accumulating() {
        let mut timer = DeviationTimer::new(1.5);
        timer.observe(true, 0.0);
        timer.observe(true, 4.0);
        assert_eq!(timer.observe(false, 4.5), 4.5);
        assert_eq!(timer.state(), DeviationState::Grace);
        assert_eq!(timer.observe(false, 5.0), 5.0);
        // Back to deviating before grace elapsed: no dip to zero
        assert_eq!(timer.observe(true, 5.2), 5.2);
        assert_eq!(timer.state(), DeviationState::Deviating);
    }

    #[test]
    fn test_timer_resets_after_grace() {
        let mut timer = DeviationTimer::new(1.5);
        timer.observe(true, 0.0);
        timer.observe(true, 5.0);
        timer.observe(false, 6.0);
        assert_eq!(timer.observe(false, 7.5), 0.0);
        assert_eq!(timer.state(), DeviationState::Idle);
        assert_eq!(timer.observe(false, 9.0), 0.0);
        // A new episode starts from zero
        assert_eq!(timer.observe(true, 10.0), 0.0);
        assert_eq!(timer.observe(true, 11.0), 1.0);
    }

    #[test]
    fn test_grace_interval_restarts_each_episode() {
        let mut timer = DeviationTimer::new(1.5);
        timer.observe(true, 0.0);
        timer.observe(false, 1.0);
        timer.observe(true, 2.0);
        // Normal again; grace is measured from 3.0, not from 1.0
        timer.observe(false, 3.0);
        assert_eq!(timer.observe(false, 4.0), 4.0);
        assert_eq!(timer.state(), DeviationState::Grace);
    }

    #[test]
    fn test_no_face_hard_resets() {
        let mut tracker = unsmoothed();
        tracker.advance(looking_away(), 0.0);
        tracker.advance(looking_away(), 4.0);
        assert!(tracker.deviation_duration() > 0.0);

        let reading = tracker.update(None, 640, 480, 4.1);
        assert!(!reading.face_detected);
        assert_eq!(reading.deviation_duration, 0.0);
        assert_eq!(tracker.state(), DeviationState::Idle);
    }

    #[test]
    fn test_single_glance_is_not_sustained() {
        let mut tracker = GazeTracker::new(GazeConfig {
            smoothing_window: 5,
            ..GazeConfig::default()
        });
        for i in 0..4 {
            tracker.advance(looking_ahead(), i as f64 * 0.1);
        }
        // One extreme frame: smoothed yaw 200/5 = 40, under the screen tier
        let reading = tracker.advance(HeadPose { yaw: 200.0, pitch: 0.0, roll: 0.0 }, 0.5);
        assert!(!reading.deviation);
        assert!(reading.minor_deviation);
        assert_eq!(reading.deviation_duration, 0.0);
    }

    #[test]
    fn test_consistency_threshold() {
        let mut tracker = GazeTracker::new(GazeConfig {
            smoothing_window: 5,
            ..GazeConfig::default()
        });
        // Smoothed yaw crosses 45 on the third frame (60, 60, 60 -> mean 60)
        let first = tracker.advance(looking_away(), 0.0);
        assert!(first.deviation, "1/1 frames deviating");
        let reading = tracker.advance(looking_ahead(), 0.1);
        // mean(60, 0) = 30: not a screen deviation; consistency 1/2 < 0.6
        assert!(!reading.deviation);
        assert!((reading.deviation_consistency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut tracker = unsmoothed();
        let reading = tracker.advance(HeadPose { yaw: 45.0, pitch: 0.0, roll: 0.0 }, 0.0);
        assert!(!reading.deviation);
        assert!(reading.minor_deviation);

        let reading = tracker.advance(HeadPose { yaw: 0.0, pitch: -35.5, roll: 0.0 }, 0.1);
        assert!(reading.deviation);
    }

    #[test]
    fn test_update_with_landmarks() {
        let mut tracker = unsmoothed();
        let mut landmarks = HeadPoseSolver::new().project(looking_away(), 640, 480);
        landmarks.landmark_count = 468;
        landmarks.face_box = Some(BoundingBox::new(0.3, 0.2, 0.4, 0.5));
        let reading = tracker.update(Some(&landmarks), 640, 480, 1.0);
        assert!(reading.face_detected);
        assert!(reading.deviation);
        assert!((reading.yaw - 60.0).abs() < 3.0);
        assert_eq!(reading.confidence, FACE_CONFIDENCE);
        assert_eq!(reading.landmarks_count, 468);
        assert_eq!(reading.face_box, Some(BoundingBox::new(0.3, 0.2, 0.4, 0.5)));
        assert!(reading.left_eye.is_none());
    }

    #[test]
    fn test_boxes_are_smoothed() {
        let mut history = BoundedWindow::new(5);
        smoothed_box(&mut history, Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0)));
        let averaged = smoothed_box(&mut history, Some(BoundingBox::new(1.0, 1.0, 1.0, 1.0))).unwrap();
        assert_eq!(averaged, BoundingBox::new(0.5, 0.5, 1.0, 1.0));
    }

    proptest! {
        #[test]
        fn prop_duration_non_decreasing_while_sustained(steps in prop::collection::vec(0.01f64..2.0, 1..50)) {
            let mut timer = DeviationTimer::new(1.5);
            let mut now = 0.0;
            let mut previous = timer.observe(true, now);
            for step in steps {
                now += step;
                let duration = timer.observe(true, now);
                prop_assert!(duration > previous);
                previous = duration;
            }
        }

        #[test]
        fn prop_short_interruptions_never_reset(gap in 0.01f64..1.49, lead in 3.0f64..30.0) {
            let mut timer = DeviationTimer::new(1.5);
            timer.observe(true, 0.0);
            let before = timer.observe(true, lead);
            let during = timer.observe(false, lead + gap);
            prop_assert!(during >= before);
            let after = timer.observe(true, lead + gap + 0.01);
            prop_assert!(after >= during);
        }

        #[test]
        fn prop_long_interruptions_reset(gap in 1.51f64..10.0, lead in 0.1f64..30.0) {
            let mut timer = DeviationTimer::new(1.5);
            timer.observe(true, 0.0);
            timer.observe(true, lead);
            timer.observe(false, lead + 0.001);
            prop_assert_eq!(timer.observe(false, lead + 0.001 + gap), 0.0);
            prop_assert_eq!(timer.state(), DeviationState::Idle);
        }
    }
}
