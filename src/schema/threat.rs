use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::SCHEMA_VERSION;
use crate::evidence::DetectionCounts;
use crate::threat::{ThreatAssessment, ThreatLevel};

/// Threat assessment as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreatReport {
    pub threat_detected: bool,
    pub threat_level: ThreatLevel,
    pub threat_score: f32,
    pub detected_activities: Vec<String>,
    pub suspicious_objects: Vec<String>,
    pub recommendations: Vec<String>,
    pub evidence_description: String,
    pub detection_counts: DetectionCounts,
    #[serde(default)]
    pub matched_rules: Vec<String>,
    pub version: String,
}

impl From<ThreatAssessment> for ThreatReport {
    fn from(assessment: ThreatAssessment) -> Self {
        let detection_counts = DetectionCounts::from_tally(&assessment.counts);
        Self {
            threat_detected: assessment.threat_detected(),
            threat_level: assessment.level,
            threat_score: assessment.score,
            detected_activities: assessment.activities,
            suspicious_objects: assessment.suspicious_objects,
            recommendations: assessment.recommendations,
            evidence_description: detection_counts.describe(),
            detection_counts,
            matched_rules: assessment.matched_rules,
            version: SCHEMA_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::CategoryTable;
    use crate::detectors::test_utils::detections;
    use crate::threat::assess;

    #[test]
    fn report_carries_counts_and_description() {
        let table = CategoryTable::default();
        let assessment = assess(&table.categorize(&detections(
            "yolo",
            &[("Rifle", 0.9), ("Deer", 0.8), ("Backpack", 0.4)],
        )));

        let report = ThreatReport::from(assessment);
        assert!(report.threat_detected);
        assert_eq!(report.threat_score, 0.98);
        assert_eq!(report.detection_counts.total, 3);
        assert_eq!(report.detection_counts.unknown, 1);
        assert_eq!(
            report.evidence_description,
            "1 weapon(s) detected | 1 animal(s) detected"
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["threatLevel"], "critical");
        assert_eq!(json["detectionCounts"]["protectedSubjects"], 1);
    }

    #[test]
    fn quiet_scene_reports_no_threat() {
        let report = ThreatReport::from(assess(&[]));
        assert!(!report.threat_detected);
        assert_eq!(report.threat_level, ThreatLevel::None);
        assert_eq!(report.evidence_description, "No threats detected");
    }
}
