//! Multi-source prediction fusion.
//!
//! Every prediction is canonicalized, grouped by entity name
//! (case-insensitive), scored with [`calibrate`], and ranked by
//! `(vote_count desc, confidence desc)`. Entity names are unique in the
//! output and `vote_count` counts distinct sources, never raw predictions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::aliases::AliasTable;
use crate::calibration::{CalibrationPolicy, calibrate};
use crate::detectors::RawDetection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    pub source_id: String,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32, source_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            confidence,
            source_id: source_id.into(),
        }
    }
}

impl From<&RawDetection> for Prediction {
    fn from(detection: &RawDetection) -> Self {
        Self::new(
            detection.label.clone(),
            detection.confidence,
            detection.source_id.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub entity_name: String,
    pub confidence: f32,
    pub vote_count: usize,
    pub contributing_sources: BTreeSet<String>,
    /// Raw labels that resolved to this entity.
    pub labels: BTreeSet<String>,
    /// False when the entity was synthesized from an unmatched label.
    pub resolved: bool,
}

#[derive(Debug, Default)]
struct Group {
    entity_name: String,
    resolved: bool,
    raw: Vec<f32>,
    sources: BTreeSet<String>,
    labels: BTreeSet<String>,
}

pub struct ConsensusAggregator<'a> {
    aliases: &'a AliasTable,
    calibration: Option<&'a CalibrationPolicy>,
    min_prediction_confidence: f32,
}

impl<'a> ConsensusAggregator<'a> {
    pub fn new(aliases: &'a AliasTable, calibration: Option<&'a CalibrationPolicy>) -> Self {
        Self {
            aliases,
            calibration,
            min_prediction_confidence: 0.0,
        }
    }

    /// Ignore predictions scoring below `floor` before grouping.
    pub fn with_min_confidence(mut self, floor: f32) -> Self {
        self.min_prediction_confidence = floor;
        self
    }

    pub fn aggregate(&self, predictions: &[Prediction], top_n: usize) -> Vec<ConsensusResult> {
        let mut groups: BTreeMap<String, Group> = BTreeMap::new();

        for prediction in predictions {
            let confidence = if prediction.confidence.is_finite() {
                prediction.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            if confidence < self.min_prediction_confidence {
                continue;
            }

            let entity = self.aliases.canonicalize(&prediction.label);
            let group = groups.entry(entity.name.to_lowercase()).or_default();
            if group.entity_name.is_empty() {
                group.entity_name = entity.name;
                group.resolved = entity.resolved;
            }
            group.raw.push(confidence);
            group.sources.insert(prediction.source_id.clone());
            group.labels.insert(prediction.label.clone());
        }

        let mut results: Vec<ConsensusResult> = groups
            .into_values()
            .map(|group| ConsensusResult {
                confidence: calibrate(&group.raw, &group.entity_name, self.calibration),
                vote_count: group.sources.len(),
                entity_name: group.entity_name,
                contributing_sources: group.sources,
                labels: group.labels,
                resolved: group.resolved,
            })
            .collect();

        results.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.entity_name.cmp(&b.entity_name))
        });

        debug!(
            predictions = predictions.len(),
            entities = results.len(),
            top_n,
            "aggregated consensus"
        );

        results.truncate(top_n);
        results
    }
}

/// How strongly the responding sources agree on the top entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusSummary {
    pub consensus_level: ConsensusLevel,
    /// Top entity's votes over responding sources.
    pub agreement: f32,
    pub responding_sources: Vec<String>,
    pub verification_notes: String,
}

/// Grade agreement on the ranked results. A single source is always LOW.
pub fn summarize(results: &[ConsensusResult], responding_sources: &[String]) -> ConsensusSummary {
    let source_list = responding_sources.join(", ");

    let Some(top) = results.first() else {
        return ConsensusSummary {
            consensus_level: ConsensusLevel::Low,
            agreement: 0.0,
            responding_sources: responding_sources.to_vec(),
            verification_notes: "No source produced a usable prediction.".to_string(),
        };
    };

    let agreement = if responding_sources.is_empty() {
        0.0
    } else {
        (top.vote_count as f32 / responding_sources.len() as f32).min(1.0)
    };

    let (consensus_level, verification_notes) = if responding_sources.len() == 1 {
        (
            ConsensusLevel::Low,
            format!(
                "Verified by {source_list} only. Consider multiple sources for higher confidence."
            ),
        )
    } else if agreement >= 1.0 {
        (
            ConsensusLevel::High,
            format!(
                "High confidence: all {} sources ({source_list}) agree on this identification.",
                responding_sources.len()
            ),
        )
    } else if agreement >= 0.5 {
        (
            ConsensusLevel::Medium,
            format!(
                "Moderate confidence: {:.0}% agreement between sources ({source_list}). Result verified by majority.",
                agreement * 100.0
            ),
        )
    } else {
        let names: Vec<&str> = results.iter().map(|r| r.entity_name.as_str()).collect();
        (
            ConsensusLevel::Low,
            format!(
                "Low consensus: sources identified different species: {}. Using highest-ranked result.",
                names.join(", ")
            ),
        )
    };

    ConsensusSummary {
        consensus_level,
        agreement,
        responding_sources: responding_sources.to_vec(),
        verification_notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::{AliasConfig, AliasEntry};
    use crate::detectors::test_utils::predictions;

    fn policy() -> CalibrationPolicy {
        CalibrationPolicy::new(0.60, 0.98, 1.5, ["Bengal Tiger"]).unwrap()
    }

    fn sources(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn aliases_from_two_sources_merge_into_one_vote_group() {
        let aliases = AliasTable::default();
        let policy = policy();
        let aggregator = ConsensusAggregator::new(&aliases, Some(&policy));

        let results = aggregator.aggregate(
            &predictions(&[("elephant", 0.70, "a"), ("Asian Elephant", 0.60, "b")]),
            5,
        );

        assert_eq!(results.len(), 1);
        let top = &results[0];
        assert_eq!(top.entity_name, "Asian Elephant");
        assert_eq!(top.vote_count, 2);
        assert_eq!(top.contributing_sources, BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert!((0.60..=0.98).contains(&top.confidence));
    }

    #[test]
    fn non_finite_confidence_stays_within_display_bounds() {
        let aliases = AliasTable::default();
        let policy = policy();
        let aggregator = ConsensusAggregator::new(&aliases, Some(&policy));

        let results = aggregator.aggregate(
            &[
                Prediction::new("tiger", f32::NAN, "a"),
                Prediction::new("leopard", f32::INFINITY, "b"),
            ],
            5,
        );

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(
                (0.60..=0.98).contains(&result.confidence),
                "{} out of bounds: {}",
                result.entity_name,
                result.confidence
            );
        }

        let floored = ConsensusAggregator::new(&aliases, Some(&policy))
            .with_min_confidence(0.01)
            .aggregate(&[Prediction::new("tiger", f32::NAN, "a")], 5);
        assert!(floored.is_empty());
    }

    #[test]
    fn repeated_predictions_from_one_source_count_once() {
        let aliases = AliasTable::default();
        let aggregator = ConsensusAggregator::new(&aliases, None);

        let results = aggregator.aggregate(
            &predictions(&[("elephant", 0.5, "a"), ("tusker", 0.3, "a")]),
            5,
        );

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].vote_count, 1);
        assert!((results[0].confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn ranking_prefers_votes_then_confidence() {
        let aliases = AliasTable::default();
        let aggregator = ConsensusAggregator::new(&aliases, None);

        let results = aggregator.aggregate(
            &predictions(&[
                ("leopard", 0.95, "a"),
                ("tiger", 0.40, "a"),
                ("tiger cat", 0.30, "b"),
                ("wolf", 0.50, "b"),
            ]),
            5,
        );

        let names: Vec<&str> = results.iter().map(|r| r.entity_name.as_str()).collect();
        assert_eq!(names, vec!["Bengal Tiger", "Indian Leopard", "Indian Wolf"]);
    }

    #[test]
    fn entity_names_are_unique_case_insensitively() {
        let aliases = AliasTable::from_config(&AliasConfig {
            entities: vec![AliasEntry::new("Bengal Tiger", &["tiger"])],
            min_reverse_substring_len: 3,
        })
        .unwrap();
        let aggregator = ConsensusAggregator::new(&aliases, None);

        let results = aggregator.aggregate(
            &predictions(&[
                ("Snow Goose", 0.4, "a"),
                ("snow goose", 0.6, "b"),
                ("SNOW_GOOSE", 0.5, "c"),
                ("TIGER", 0.9, "a"),
            ]),
            10,
        );

        let names: BTreeSet<String> = results.iter().map(|r| r.entity_name.to_lowercase()).collect();
        assert_eq!(names.len(), results.len());
        assert_eq!(results[0].entity_name, "Snow Goose");
        assert_eq!(results[0].vote_count, 3);
        assert!(!results[0].resolved);
    }

    #[test]
    fn confidences_stay_within_display_bounds() {
        let aliases = AliasTable::default();
        let policy = policy();
        let aggregator = ConsensusAggregator::new(&aliases, Some(&policy));

        let results = aggregator.aggregate(
            &predictions(&[
                ("tiger", 1.0, "a"),
                ("tiger", 0.99, "b"),
                ("hare", 0.02, "a"),
                ("owl", 0.5, "c"),
            ]),
            10,
        );

        for result in &results {
            assert!(
                (0.60..=0.98).contains(&result.confidence),
                "{} out of bounds: {}",
                result.entity_name,
                result.confidence
            );
        }
    }

    #[test]
    fn floor_and_truncation_apply() {
        let aliases = AliasTable::default();
        let aggregator = ConsensusAggregator::new(&aliases, None).with_min_confidence(0.05);

        let results = aggregator.aggregate(
            &predictions(&[
                ("tiger", 0.9, "a"),
                ("wolf", 0.5, "a"),
                ("fox", 0.3, "a"),
                ("hare", 0.01, "a"),
            ]),
            2,
        );

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.entity_name != "Indian Hare"));
    }

    #[test]
    fn vote_count_never_exceeds_distinct_sources() {
        let aliases = AliasTable::default();
        let aggregator = ConsensusAggregator::new(&aliases, None);
        let input = predictions(&[
            ("tiger", 0.9, "a"),
            ("tiger", 0.8, "a"),
            ("bengal tiger", 0.7, "b"),
        ]);
        let distinct: BTreeSet<&str> = input.iter().map(|p| p.source_id.as_str()).collect();

        let results = aggregator.aggregate(&input, 5);
        assert!(results.iter().all(|r| r.vote_count <= distinct.len()));
    }

    #[test]
    fn empty_input_yields_empty_consensus() {
        let aliases = AliasTable::default();
        let aggregator = ConsensusAggregator::new(&aliases, None);
        assert!(aggregator.aggregate(&[], 5).is_empty());
    }

    #[test]
    fn summary_levels_follow_agreement() {
        let aliases = AliasTable::default();
        let aggregator = ConsensusAggregator::new(&aliases, None);

        let full = aggregator.aggregate(
            &predictions(&[("tiger", 0.9, "a"), ("tiger", 0.8, "b")]),
            5,
        );
        let summary = summarize(&full, &sources(&["a", "b"]));
        assert_eq!(summary.consensus_level, ConsensusLevel::High);
        assert_eq!(summary.agreement, 1.0);

        let summary = summarize(&full, &sources(&["a", "b", "c"]));
        assert_eq!(summary.consensus_level, ConsensusLevel::Medium);
        assert!(summary.verification_notes.contains("67% agreement"));

        let split = aggregator.aggregate(
            &predictions(&[("tiger", 0.9, "a"), ("wolf", 0.8, "b"), ("fox", 0.7, "c")]),
            5,
        );
        let summary = summarize(&split, &sources(&["a", "b", "c"]));
        assert_eq!(summary.consensus_level, ConsensusLevel::Low);
        assert!(summary.verification_notes.contains("Bengal Tiger"));
    }

    #[test]
    fn single_source_summary_is_low() {
        let aliases = AliasTable::default();
        let aggregator = ConsensusAggregator::new(&aliases, None);
        let results = aggregator.aggregate(&predictions(&[("tiger", 0.9, "custom")]), 5);

        let summary = summarize(&results, &sources(&["custom"]));
        assert_eq!(summary.consensus_level, ConsensusLevel::Low);
        assert!(summary.verification_notes.starts_with("Verified by custom only"));
    }

    #[test]
    fn empty_summary_is_low() {
        let summary = summarize(&[], &sources(&["a", "b"]));
        assert_eq!(summary.consensus_level, ConsensusLevel::Low);
        assert_eq!(summary.agreement, 0.0);
    }
}
