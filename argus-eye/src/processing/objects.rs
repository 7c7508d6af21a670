//! Object stream classification
//!
//! Filters raw detector output by confidence, counts persons above their
//! own stricter floor, and maps forbidden classes to display labels.

use crate::models::RawDetection;
use argus_core::{Detection, ForbiddenItem, ObjectConfig, ObjectModelInfo, ObjectReading};
use std::collections::BTreeMap;

pub struct ObjectFilter {
    config: ObjectConfig,
}

impl ObjectFilter {
    pub fn new(config: ObjectConfig) -> Self {
        Self { config }
    }

    /// Persons, forbidden items and the mean confidence cover every
    /// detection above the floor; only `all_detections` is capped.
    pub fn classify(&self, detections: &[RawDetection]) -> ObjectReading {
        let kept: Vec<&RawDetection> = detections
            .iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= self.config.detection_confidence)
            .collect();

        let mut reading = ObjectReading::default();
        for detection in &kept {
            let bbox = detection.bounding_box();

            if detection.class_name == self.config.person_label {
                if detection.confidence > self.config.person_confidence {
                    reading.person_count += 1;
                }
            } else if let Some(label) = self.config.forbidden_classes.get(&detection.class_name) {
                reading.forbidden_items.push(ForbiddenItem {
                    object: label.clone(),
                    confidence: detection.confidence,
                    bbox,
                    class_name: detection.class_name.clone(),
                });
            }

            reading.all_detections.push(Detection {
                class_name: detection.class_name.clone(),
                confidence: detection.confidence,
                bbox,
            });
        }

        if reading.all_detections.len() > self.config.max_detections {
            reading
                .all_detections
                .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
            reading.all_detections.truncate(self.config.max_detections);
        }

        if !kept.is_empty() {
            reading.confidence =
                kept.iter().map(|d| d.confidence).sum::<f64>() / kept.len() as f64;
        }

        reading
    }

    pub fn add_forbidden_class(&mut self, class_name: &str, label: &str) {
        self.config
            .forbidden_classes
            .insert(class_name.to_string(), label.to_string());
    }

    /// Returns whether the class was present
    pub fn remove_forbidden_class(&mut self, class_name: &str) -> bool {
        self.config.forbidden_classes.remove(class_name).is_some()
    }

    pub fn forbidden_classes(&self) -> &BTreeMap<String, String> {
        &self.config.forbidden_classes
    }

    pub fn model_info(&self, model: &str) -> ObjectModelInfo {
        ObjectModelInfo {
            model: model.to_string(),
            detection_confidence: self.config.detection_confidence,
            person_confidence: self.config.person_confidence,
            forbidden_classes: self.config.forbidden_classes.clone(),
        }
    }
}
