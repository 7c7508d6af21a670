//! Risk scoring
//!
//! Additive model over three violation types (screen gaze, forbidden
//! objects, secondary persons). When two or more types co-occur the sum
//! is multiplied; the behavioral pattern score is then added unmultiplied
//! and the result clamped to [0, 100].

use super::behavior::{FREQUENT_DEVIATIONS_NOTE, REPEATED_OBJECTS_NOTE};
use argus_core::{
    AlertLevel, BehaviorSummary, DetectionBundle, RiskAssessment, RiskDetails, ScoringConfig,
};

pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, bundle: &DetectionBundle, behavior: &BehaviorSummary) -> RiskAssessment {
        let mut violations = Vec::new();
        let mut violation_types = 0usize;

        let duration = bundle.gaze.deviation_duration;
        let screen_contribution = match self.screen_tier(duration) {
            Some((weight, suffix)) => {
                violations.push(format!(
                    "Looking at another screen for {:.1}s{}",
                    duration, suffix
                ));
                violation_types += 1;
                weight
            }
            None => 0.0,
        };

        let items = &bundle.objects.forbidden_items;
        let mut object_contribution = 0.0;
        for item in items {
            object_contribution += self.config.forbidden_object_weight * item.confidence;
            violations.push(format!("Forbidden object detected: {}", item.object));
        }
        let has_objects = !items.is_empty();
        if has_objects {
            violation_types += 1;
        }

        let person_count = bundle.objects.person_count;
        let extra_persons = person_count.saturating_sub(1);
        let person_contribution = self.config.secondary_person_weight * extra_persons as f64;
        let has_persons = extra_persons > 0;
        if has_persons {
            violations.push(format!("Multiple persons detected: {}", person_count));
            violation_types += 1;
        }

        let multiplier_applied = violation_types >= 2;
        let mut base_score = screen_contribution + object_contribution + person_contribution;
        if multiplier_applied {
            base_score *= self.config.multiple_violations_multiplier;
        }

        let behavior_contribution = behavior.pattern_score;
        let total = base_score + behavior_contribution;
        let risk_score = if total.is_nan() { 100.0 } else { total.clamp(0.0, 100.0) };
        let alert_level = AlertLevel::from_score(risk_score);

        let recommendations = recommendations(alert_level, has_persons, has_objects, behavior);

        RiskAssessment {
            risk_score,
            violation_count: violation_types,
            violations,
            alert_level,
            recommendations,
            details: RiskDetails {
                base_score,
                screen_deviation_contribution: screen_contribution,
                screen_deviation_duration: duration,
                object_contribution,
                person_contribution,
                behavior_contribution,
                multiplier_applied,
                person_count,
                forbidden_items_count: items.len(),
            },
        }
    }

    /// Longest satisfied duration tier, if any
    fn screen_tier(&self, duration: f64) -> Option<(f64, &'static str)> {
        let config = &self.config;
        if duration >= config.critical_deviation_secs {
            Some((config.screen_deviation_critical_weight, " (CRITICAL)"))
        } else if duration >= config.extended_deviation_secs {
            Some((config.screen_deviation_extended_weight, " (extended)"))
        } else if duration >= config.min_deviation_secs {
            Some((config.screen_deviation_base_weight, ""))
        } else {
            None
        }
    }
}

fn recommendations(
    level: AlertLevel,
    has_persons: bool,
    has_objects: bool,
    behavior: &BehaviorSummary,
) -> Vec<String> {
    let base: &[&str] = match level {
        AlertLevel::Critical => &[
            "Immediate intervention required",
            "Flag session for manual review",
            "Consider terminating session",
        ],
        AlertLevel::High => &[
            "Issue warning to candidate",
            "Increase monitoring intensity",
            "Log incident for review",
        ],
        AlertLevel::Medium => &["Monitor situation closely", "Log for pattern analysis"],
        _ => &["Continue normal monitoring"],
    };

    let mut actions: Vec<String> = base.iter().map(|s| s.to_string()).collect();

    if has_persons {
        actions.push("Verify candidate identity".to_string());
        actions.push("Request room scan".to_string());
    }
    if has_objects {
        actions.push("Request removal of prohibited items".to_string());
        actions.push("Verify workspace compliance".to_string());
    }
    if behavior.summary.contains(FREQUENT_DEVIATIONS_NOTE) {
        actions.push("Investigate frequent attention shifts".to_string());
    }
    if behavior.summary.contains(REPEATED_OBJECTS_NOTE) {
        actions.push("Persistent object violation - escalate".to_string());
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{BoundingBox, ForbiddenItem, GazeReading, ObjectReading};
    use proptest::prelude::*;

    fn scorer() -> RiskScorer {
        RiskScorer::new(ScoringConfig::default())
    }

    fn item(label: &str, confidence: f64) -> ForbiddenItem {
        ForbiddenItem {
            object: label.to_string(),
            confidence,
            bbox: BoundingBox::default(),
            class_name: label.to_string(),
        }
    }

    fn bundle(duration: f64, persons: u32, items: Vec<ForbiddenItem>) -> DetectionBundle {
        DetectionBundle {
            gaze: GazeReading {
                face_detected: true,
                deviation: duration > 0.0,
                deviation_duration: duration,
                ..GazeReading::default()
            },
            objects: ObjectReading {
                person_count: persons,
                forbidden_items: items,
                ..ObjectReading::default()
            },
            timestamp: 0.0,
            degraded_streams: Vec::new(),
        }
    }

    fn calm() -> BehaviorSummary {
        BehaviorSummary::with_note("Normal behavior")
    }

    #[test]
    fn test_clean_frame_is_low() {
        let risk = scorer().score(&bundle(0.0, 1, vec![]), &calm());
        assert_eq!(risk.risk_score, 0.0);
        assert_eq!(risk.alert_level, AlertLevel::Low);
        assert_eq!(risk.recommendations, vec!["Continue normal monitoring"]);
        assert_eq!(risk.violation_count, 0);
    }

    #[test]
    fn test_short_deviation_not_scored() {
        let risk = scorer().score(&bundle(2.0, 1, vec![]), &calm());
        assert_eq!(risk.details.screen_deviation_contribution, 0.0);
        assert_eq!(risk.risk_score, 0.0);
        assert!(risk.violations.is_empty());
    }

    #[test]
    fn test_duration_tiers() {
        let scorer = scorer();
        let base = scorer.score(&bundle(3.0, 1, vec![]), &calm());
        assert_eq!(base.risk_score, 50.0);
        assert_eq!(base.violations, vec!["Looking at another screen for 3.0s"]);

        let extended = scorer.score(&bundle(15.0, 1, vec![]), &calm());
        assert_eq!(extended.risk_score, 70.0);
        assert_eq!(extended.alert_level, AlertLevel::High);
        assert_eq!(extended.violations, vec!["Looking at another screen for 15.0s (extended)"]);

        let critical = scorer.score(&bundle(20.0, 1, vec![]), &calm());
        assert_eq!(critical.risk_score, 90.0);
        assert_eq!(critical.alert_level, AlertLevel::Critical);
        assert!(critical.violations[0].ends_with("(CRITICAL)"));
        assert_eq!(critical.recommendations[0], "Immediate intervention required");
    }

    #[test]
    fn test_secondary_persons_single_type() {
        let risk = scorer().score(&bundle(0.0, 3, vec![]), &calm());
        assert_eq!(risk.risk_score, 100.0_f64.min(60.0 * 2.0));
        assert_eq!(risk.details.person_contribution, 120.0);
        assert_eq!(risk.violation_count, 1);
        assert!(!risk.details.multiplier_applied);
        assert_eq!(risk.violations, vec!["Multiple persons detected: 3"]);
        assert!(risk.recommendations.contains(&"Verify candidate identity".to_string()));
    }

    #[test]
    fn test_object_and_person_apply_multiplier() {
        let risk = scorer().score(&bundle(0.0, 2, vec![item("phone", 0.8)]), &calm());
        let expected_base = (70.0 * 0.8 + 60.0) * 1.3;
        assert!(risk.details.multiplier_applied);
        assert_eq!(risk.violation_count, 2);
        assert!((risk.details.base_score - expected_base).abs() < 1e-9);
        assert_eq!(risk.risk_score, 100.0);
    }

    #[test]
    fn test_multiple_items_count_as_one_type() {
        let risk = scorer().score(
            &bundle(0.0, 1, vec![item("phone", 0.3), item("book", 0.2)]),
            &calm(),
        );
        assert_eq!(risk.violation_count, 1);
        assert_eq!(risk.violations.len(), 2);
        assert!(!risk.details.multiplier_applied);
        assert!((risk.risk_score - 35.0).abs() < 1e-9);
        assert_eq!(risk.alert_level, AlertLevel::Medium);
        assert!(risk
            .recommendations
            .contains(&"Verify workspace compliance".to_string()));
    }

    #[test]
    fn test_behavior_added_after_multiplier() {
        let behavior = BehaviorSummary {
            pattern_score: 10.0,
            summary: format!("{}; {}", FREQUENT_DEVIATIONS_NOTE, REPEATED_OBJECTS_NOTE),
            ..BehaviorSummary::default()
        };
        let risk = scorer().score(&bundle(0.0, 1, vec![item("book", 0.1)]), &behavior);
        assert!((risk.risk_score - 17.0).abs() < 1e-9);
        assert_eq!(risk.details.behavior_contribution, 10.0);
        assert!(risk
            .recommendations
            .contains(&"Investigate frequent attention shifts".to_string()));
        assert!(risk
            .recommendations
            .contains(&"Persistent object violation - escalate".to_string()));
    }

    #[test]
    fn test_zero_persons_not_a_violation() {
        let risk = scorer().score(&bundle(0.0, 0, vec![]), &calm());
        assert_eq!(risk.details.person_contribution, 0.0);
        assert_eq!(risk.violation_count, 0);
    }

    #[test]
    fn test_ten_forbidden_items_clamped() {
        let items = (0..10).map(|_| item("phone", 1.0)).collect();
        let risk = scorer().score(&bundle(25.0, 5, items), &calm());
        assert_eq!(risk.risk_score, 100.0);
        assert_eq!(risk.violation_count, 3);
    }

    proptest! {
        #[test]
        fn prop_score_always_clamped(
            duration in 0.0f64..1000.0,
            persons in 0u32..50,
            confidences in prop::collection::vec(0.0f64..=1.0, 0..20),
            pattern in 0.0f64..=100.0,
        ) {
            let items = confidences.iter().map(|c| item("phone", *c)).collect();
            let behavior = BehaviorSummary { pattern_score: pattern, ..BehaviorSummary::default() };
            let risk = scorer().score(&bundle(duration, persons, items), &behavior);
            prop_assert!(risk.risk_score >= 0.0 && risk.risk_score <= 100.0);
            prop_assert_eq!(risk.alert_level, AlertLevel::from_score(risk.risk_score));
            prop_assert!(risk.violation_count <= 3);
        }
    }
}
