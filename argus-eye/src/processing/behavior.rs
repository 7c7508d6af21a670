//! Sliding-window behavioral aggregation
//!
//! Each processed frame appends one entry to a fixed-capacity window.
//! The pattern score is derived from the window alone; lifetime totals
//! are kept separately for session reports and never feed the score.

use super::window::BoundedWindow;
use argus_core::{BehaviorConfig, BehaviorSummary, DetectionBundle, ForbiddenItem, SessionStatistics};

const DEVIATION_WEIGHT: f64 = 30.0;
const OBJECT_WEIGHT: f64 = 40.0;
const PERSON_WEIGHT: f64 = 30.0;

const FREQUENT_DEVIATION_RATIO: f64 = 0.3;
const REPEATED_OBJECT_RATIO: f64 = 0.2;
const CROWDED_PERSON_AVERAGE: f64 = 1.5;

pub const FREQUENT_DEVIATIONS_NOTE: &str = "Frequent gaze deviations detected";
pub const REPEATED_OBJECTS_NOTE: &str = "Repeated forbidden object detections";
pub const MULTIPLE_PERSONS_NOTE: &str = "Multiple persons frequently present";
pub const NORMAL_BEHAVIOR_NOTE: &str = "Normal behavior";

/// One retained frame outcome
#[derive(Debug, Clone)]
pub struct WindowEntry {
    pub deviation: bool,
    pub forbidden_items: Vec<ForbiddenItem>,
    pub person_count: u32,
    pub timestamp: f64,
}

#[derive(Debug, Default, Clone)]
struct LifetimeTotals {
    frames: u64,
    deviations: u64,
    object_detections: u64,
    person_sum: u64,
}

/// Per-session behavioral window
pub struct BehaviorAggregator {
    window: BoundedWindow<WindowEntry>,
    totals: LifetimeTotals,
}

impl BehaviorAggregator {
    pub fn new(config: &BehaviorConfig) -> Self {
        Self {
            window: BoundedWindow::new(config.window_size),
            totals: LifetimeTotals::default(),
        }
    }

    /// Append the frame's outcome and summarize the updated window
    pub fn update_and_analyze(&mut self, bundle: &DetectionBundle) -> BehaviorSummary {
        let entry = WindowEntry {
            deviation: bundle.gaze.deviation,
            forbidden_items: bundle.objects.forbidden_items.clone(),
            person_count: bundle.objects.person_count,
            timestamp: bundle.timestamp,
        };

        self.totals.frames += 1;
        self.totals.deviations += u64::from(entry.deviation);
        self.totals.object_detections += entry.forbidden_items.len() as u64;
        self.totals.person_sum += u64::from(entry.person_count);

        self.window.push(entry);
        self.analyze()
    }

    /// Summarize the current window without modifying it
    pub fn analyze(&self) -> BehaviorSummary {
        let capacity = self.window.capacity() as f64;

        let repeated_deviations = self.window.iter().filter(|e| e.deviation).count();
        let repeated_objects = self
            .window
            .iter()
            .filter(|e| !e.forbidden_items.is_empty())
            .count();
        let avg_person_count = if self.window.is_empty() {
            0.0
        } else {
            self.window.iter().map(|e| e.person_count as f64).sum::<f64>()
                / self.window.len() as f64
        };

        let pattern_score = (DEVIATION_WEIGHT * (repeated_deviations as f64 / capacity)
            + OBJECT_WEIGHT * (repeated_objects as f64 / capacity)
            + PERSON_WEIGHT * (avg_person_count - 1.0).max(0.0))
        .min(100.0);

        let mut notes = Vec::new();
        if repeated_deviations as f64 > capacity * FREQUENT_DEVIATION_RATIO {
            notes.push(FREQUENT_DEVIATIONS_NOTE);
        }
        if repeated_objects as f64 > capacity * REPEATED_OBJECT_RATIO {
            notes.push(REPEATED_OBJECTS_NOTE);
        }
        if avg_person_count > CROWDED_PERSON_AVERAGE {
            notes.push(MULTIPLE_PERSONS_NOTE);
        }
        let summary = if notes.is_empty() {
            NORMAL_BEHAVIOR_NOTE.to_string()
        } else {
            notes.join("; ")
        };

        BehaviorSummary {
            pattern_score,
            repeated_deviations,
            repeated_objects,
            avg_person_count,
            window_frames: self.window.len(),
            summary,
        }
    }

    pub fn statistics(&self) -> SessionStatistics {
        let avg_person_count = if self.totals.frames == 0 {
            0.0
        } else {
            self.totals.person_sum as f64 / self.totals.frames as f64
        };

        SessionStatistics {
            total_frames_analyzed: self.totals.frames,
            total_gaze_deviations: self.totals.deviations,
            total_object_detections: self.totals.object_detections,
            avg_person_count,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.window.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{BoundingBox, GazeReading, ObjectReading};

    fn bundle(deviation: bool, items: usize, persons: u32, timestamp: f64) -> DetectionBundle {
        let forbidden_items = (0..items)
            .map(|_| ForbiddenItem {
                object: "phone".to_string(),
                confidence: 0.8,
                bbox: BoundingBox::default(),
                class_name: "cell phone".to_string(),
            })
            .collect();
        DetectionBundle {
            gaze: GazeReading {
                face_detected: true,
                deviation,
                ..GazeReading::default()
            },
            objects: ObjectReading {
                person_count: persons,
                forbidden_items,
                ..ObjectReading::default()
            },
            timestamp,
            degraded_streams: Vec::new(),
        }
    }

    fn aggregator(window_size: usize) -> BehaviorAggregator {
        BehaviorAggregator::new(&BehaviorConfig { window_size })
    }

    #[test]
    fn test_normal_behavior() {
        let mut agg = aggregator(200);
        let summary = agg.update_and_analyze(&bundle(false, 0, 1, 0.0));
        assert_eq!(summary.pattern_score, 0.0);
        assert_eq!(summary.summary, NORMAL_BEHAVIOR_NOTE);
        assert_eq!(summary.window_frames, 1);
    }

    #[test]
    fn test_ratios_use_capacity_not_length() {
        let mut agg = aggregator(10);
        let summary = agg.update_and_analyze(&bundle(true, 1, 1, 0.0));
        // 30 * 1/10 + 40 * 1/10
        assert!((summary.pattern_score - 7.0).abs() < 1e-9);
        assert_eq!(summary.summary, NORMAL_BEHAVIOR_NOTE);
    }

    #[test]
    fn test_all_notes_raised() {
        let mut agg = aggregator(10);
        let mut summary = BehaviorSummary::default();
        for i in 0..4 {
            summary = agg.update_and_analyze(&bundle(true, 1, 2, i as f64));
        }
        assert_eq!(summary.repeated_deviations, 4);
        assert_eq!(summary.repeated_objects, 4);
        assert_eq!(summary.avg_person_count, 2.0);
        assert_eq!(
            summary.summary,
            "Frequent gaze deviations detected; Repeated forbidden object detections; Multiple persons frequently present"
        );
        // 30*0.4 + 40*0.4 + 30*1
        assert!((summary.pattern_score - 58.0).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_score_capped() {
        let mut agg = aggregator(1);
        let summary = agg.update_and_analyze(&bundle(true, 3, 10, 0.0));
        assert_eq!(summary.pattern_score, 100.0);
    }

    #[test]
    fn test_window_evicts_fifo() {
        let mut agg = aggregator(3);
        agg.update_and_analyze(&bundle(true, 0, 1, 0.0));
        for i in 1..4 {
            agg.update_and_analyze(&bundle(false, 0, 1, i as f64));
        }
        assert_eq!(agg.window_len(), 3);
        let timestamps: Vec<f64> = agg.entries().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![1.0, 2.0, 3.0]);
        assert_eq!(agg.analyze().repeated_deviations, 0);
    }

    #[test]
    fn test_lifetime_statistics_outlive_window() {
        let mut agg = aggregator(2);
        agg.update_and_analyze(&bundle(true, 2, 1, 0.0));
        agg.update_and_analyze(&bundle(false, 0, 3, 1.0));
        agg.update_and_analyze(&bundle(true, 1, 2, 2.0));
        let stats = agg.statistics();
        assert_eq!(stats.total_frames_analyzed, 3);
        assert_eq!(stats.total_gaze_deviations, 2);
        assert_eq!(stats.total_object_detections, 3);
        assert_eq!(stats.avg_person_count, 2.0);
    }

    #[test]
    fn test_analyze_is_pure() {
        let mut agg = aggregator(5);
        agg.update_and_analyze(&bundle(true, 1, 1, 0.0));
        let first = agg.analyze();
        let second = agg.analyze();
        assert_eq!(first, second);
        assert_eq!(agg.window_len(), 1);
    }
}
