use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Ruleset;
use crate::consensus::{ConsensusAggregator, Prediction, summarize};
use crate::detectors::normalize::normalize_sources;
use crate::detectors::{Detector, RawDetection};
use crate::error::{EngineError, SourceError};
use crate::knowledge::{Enricher, KnowledgeStore};
use crate::schema::{IdentificationReport, SourceFailure, ThreatReport};
use crate::threat;

/// Per-source results of one fan-out, after every call has settled.
#[derive(Debug, Default)]
pub struct FanOut {
    pub responses: Vec<(String, Vec<RawDetection>)>,
    pub failures: Vec<SourceError>,
}

impl FanOut {
    pub fn responding_sources(&self) -> Vec<String> {
        self.responses.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn detections(&self) -> Vec<RawDetection> {
        self.responses
            .iter()
            .flat_map(|(_, detections)| detections.iter().cloned())
            .collect()
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.responses
            .iter()
            .flat_map(|(_, detections)| detections.iter().map(Prediction::from))
            .collect()
    }
}

pub struct DetectionEngine {
    ruleset: Arc<Ruleset>,
    detectors: Vec<Box<dyn Detector>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
}

impl DetectionEngine {
    pub fn new(ruleset: Arc<Ruleset>) -> Self {
        Self {
            ruleset,
            detectors: Vec::new(),
            knowledge: None,
        }
    }

    pub fn register<D: Detector + 'static>(mut self, detector: D) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn with_knowledge_store<S: KnowledgeStore + 'static>(mut self, store: S) -> Self {
        self.knowledge = Some(Arc::new(store));
        self
    }

    /// Run every registered detector concurrently, each under its own timeout.
    ///
    /// A detector that errors or times out is recorded in `failures` and
    /// contributes nothing. Returns only once every call has settled.
    pub async fn fan_out(&self, image: &[u8]) -> FanOut {
        let after_ms = self.ruleset.fanout.timeout_ms;
        let limit = Duration::from_millis(after_ms);
        let threshold = self.ruleset.fanout.confidence_threshold;

        let calls = self.detectors.iter().map(|detector| async move {
            let source_id = detector.name().to_string();
            let outcome = match tokio::time::timeout(limit, detector.detect(image, threshold)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout {
                    source_id: source_id.clone(),
                    after_ms,
                }),
            };
            (source_id, outcome)
        });

        let mut fan_out = FanOut::default();
        for (source_id, outcome) in join_all(calls).await {
            match outcome {
                Ok(detections) => {
                    debug!(source = %source_id, detections = detections.len(), "source responded");
                    let detections = detections
                        .into_iter()
                        .map(|mut d| {
                            d.source_id = source_id.clone();
                            d
                        })
                        .collect();
                    fan_out.responses.push((source_id, detections));
                }
                Err(e) => {
                    warn!(source = %source_id, error = %e, "source excluded from consensus");
                    fan_out.failures.push(e);
                }
            }
        }

        info!(
            responded = fan_out.responses.len(),
            failed = fan_out.failures.len(),
            "fan-out settled"
        );
        fan_out
    }

    pub fn assess_threat(&self, detections: &[RawDetection]) -> ThreatReport {
        let categorized = self.ruleset.categories.categorize(detections);
        ThreatReport::from(threat::assess(&categorized))
    }

    /// Normalize recorded detector output, then assess it.
    ///
    /// Recorded detections are taken as reported; the fan-out confidence
    /// threshold only applies to live detectors.
    pub fn assess_payload(&self, payload: &Value) -> Result<ThreatReport, EngineError> {
        let detections: Vec<RawDetection> = normalize_sources(payload, "request")?
            .into_iter()
            .flat_map(|(_, detections)| detections)
            .collect();
        Ok(self.assess_threat(&detections))
    }

    pub async fn assess_image(&self, image: &[u8]) -> ThreatReport {
        let fan_out = self.fan_out(image).await;
        self.assess_threat(&fan_out.detections())
    }

    /// Consensus over already-collected predictions, then enrichment.
    pub fn identify(
        &self,
        predictions: &[Prediction],
        responding_sources: &[String],
        failures: &[SourceError],
        top_n: Option<usize>,
    ) -> IdentificationReport {
        let ruleset = &self.ruleset;
        let aggregator = ConsensusAggregator::new(&ruleset.aliases, ruleset.calibration.as_ref())
            .with_min_confidence(ruleset.consensus.min_prediction_confidence);
        let results = aggregator.aggregate(predictions, top_n.unwrap_or(ruleset.consensus.top_n));
        let summary = summarize(&results, responding_sources);

        let enricher = match &self.knowledge {
            Some(store) => Enricher::new(store.as_ref()),
            None => Enricher::offline(),
        };

        IdentificationReport::new(
            enricher.enrich_all(results),
            summary,
            failures.iter().map(SourceFailure::from).collect(),
        )
    }

    /// Consensus over recorded per-source predictions. Every listed source
    /// counts as responding, even one that returned nothing.
    pub fn identify_payload(
        &self,
        payload: &Value,
        top_n: Option<usize>,
    ) -> Result<IdentificationReport, EngineError> {
        let sources = normalize_sources(payload, "request")?;
        let responding: Vec<String> = sources.iter().map(|(id, _)| id.clone()).collect();
        let predictions: Vec<Prediction> = sources
            .iter()
            .flat_map(|(source_id, detections)| {
                detections
                    .iter()
                    .map(move |d| Prediction::new(d.label.clone(), d.confidence, source_id.clone()))
            })
            .collect();
        Ok(self.identify(&predictions, &responding, &[], top_n))
    }

    pub async fn identify_image(&self, image: &[u8], top_n: Option<usize>) -> IdentificationReport {
        let fan_out = self.fan_out(image).await;
        self.identify(
            &fan_out.predictions(),
            &fan_out.responding_sources(),
            &fan_out.failures,
            top_n,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::ReplayDetector;
    use crate::detectors::test_utils::{detections, predictions};
    use crate::knowledge::{InMemoryKnowledgeStore, KnowledgeRecord};
    use crate::threat::ThreatLevel;
    use serde_json::json;

    fn engine() -> DetectionEngine {
        DetectionEngine::new(Arc::new(Ruleset::default()))
    }

    #[test]
    fn assess_payload_rejects_null() {
        assert!(matches!(
            engine().assess_payload(&Value::Null),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn assess_payload_handles_detector_shape() {
        let report = engine()
            .assess_payload(&json!([{"class": "Hunter", "confidence": 0.7}, {"class": "Jeep", "confidence": 0.6}]))
            .unwrap();
        assert_eq!(report.threat_level, ThreatLevel::High);
        assert_eq!(report.threat_score, 0.85);
        assert_eq!(report.detection_counts.total, 2);
    }

    #[test]
    fn assess_payload_ignores_fanout_threshold() {
        let report = engine()
            .assess_payload(&json!({"sources": {
                "yolo": [{"class": "Rifle", "confidence": 0.1}],
                "backup": [{"class": "Deer", "confidence": 0.05}]
            }}))
            .unwrap();
        assert_eq!(report.threat_level, ThreatLevel::Critical);
        assert_eq!(report.detection_counts.weapons, 1);
        assert_eq!(report.detection_counts.total, 2);
    }

    #[test]
    fn identify_payload_votes_per_listed_source() {
        let report = engine()
            .identify_payload(
                &json!({"sources": {
                    "custom": [{"species": "elephant", "confidence": 0.7, "model": "spoofed"}],
                    "mobilenet": [{"species": "Asian Elephant", "confidencePercent": 60}],
                    "silent": []
                }}),
                None,
            )
            .unwrap();

        let top = report.top().unwrap();
        assert_eq!(top.result.vote_count, 2);
        assert!(top.result.contributing_sources.contains("custom"));
        assert_eq!(report.consensus.responding_sources.len(), 3);
    }

    #[test]
    fn identify_enriches_known_entities() {
        let store = InMemoryKnowledgeStore::from_records(vec![KnowledgeRecord {
            species_name: "Asian Elephant".into(),
            scientific_name: "Elephas maximus".into(),
            conservation_status: "Endangered".into(),
            population: String::new(),
            habitat: String::new(),
            threats: Vec::new(),
            region: "India".into(),
            category: "Mammal".into(),
            description: String::new(),
        }]);
        let engine = engine().with_knowledge_store(store);

        let report = engine.identify(
            &predictions(&[("elephant", 0.7, "custom"), ("Asian Elephant", 0.6, "mobilenet")]),
            &["custom".to_string(), "mobilenet".to_string()],
            &[],
            None,
        );

        let top = report.top().unwrap();
        assert_eq!(top.result.entity_name, "Asian Elephant");
        assert_eq!(top.result.vote_count, 2);
        assert!(top.details.enriched);
        assert_eq!(report.consensus.agreement, 1.0);
    }

    #[tokio::test]
    async fn fan_out_stamps_source_ids() {
        let engine = engine()
            .register(ReplayDetector::new("yolo", detections("recorded", &[("Rifle", 0.9)])))
            .register(ReplayDetector::new("backup", detections("recorded", &[("Deer", 0.8)])));

        let fan_out = engine.fan_out(&[]).await;
        assert!(fan_out.failures.is_empty());
        assert_eq!(fan_out.responding_sources(), vec!["yolo", "backup"]);
        assert!(fan_out.detections().iter().all(|d| d.source_id != "recorded"));

        let report = engine.assess_image(&[]).await;
        assert_eq!(report.threat_score, 0.98);
    }
}
