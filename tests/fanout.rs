use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use wildsense::detectors::test_utils::detections;
use wildsense::detectors::{Detector, RawDetection, ReplayDetector};
use wildsense::error::SourceError;
use wildsense::threat::ThreatLevel;
use wildsense::{DetectionEngine, EngineConfig, Ruleset};

struct SlowDetector;

#[async_trait]
impl Detector for SlowDetector {
    fn name(&self) -> &str {
        "slow"
    }

    async fn detect(&self, _image: &[u8], _threshold: f32) -> Result<Vec<RawDetection>, SourceError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(detections("slow", &[("Rifle", 0.99)]))
    }
}

struct BrokenDetector;

#[async_trait]
impl Detector for BrokenDetector {
    fn name(&self) -> &str {
        "broken"
    }

    async fn detect(&self, _image: &[u8], _threshold: f32) -> Result<Vec<RawDetection>, SourceError> {
        Err(SourceError::Failed {
            source_id: "broken".into(),
            reason: "model not loaded".into(),
        })
    }
}

fn ruleset(timeout_ms: u64) -> Arc<Ruleset> {
    let mut config = EngineConfig::default();
    config.fanout.timeout_ms = timeout_ms;
    Ruleset::shared(&config).unwrap()
}

#[tokio::test]
async fn slow_and_broken_sources_are_excluded() {
    let engine = DetectionEngine::new(ruleset(50))
        .register(SlowDetector)
        .register(BrokenDetector)
        .register(ReplayDetector::new(
            "custom",
            detections("custom", &[("elephant", 0.7)]),
        ))
        .register(ReplayDetector::new(
            "mobilenet",
            detections("mobilenet", &[("Asian Elephant", 0.6)]),
        ));

    let report = engine.identify_image(&[], None).await;

    let top = report.top().expect("consensus result");
    assert_eq!(top.result.entity_name, "Asian Elephant");
    assert_eq!(top.result.vote_count, 2);
    assert_eq!(report.consensus.responding_sources, vec!["custom", "mobilenet"]);

    let failed: Vec<&str> = report
        .failed_sources
        .iter()
        .map(|f| f.source_id.as_str())
        .collect();
    assert_eq!(failed, vec!["slow", "broken"]);
    assert!(report.failed_sources[0].reason.contains("timed out after 50ms"));
}

#[tokio::test]
async fn timed_out_weapon_detection_does_not_count() {
    let engine = DetectionEngine::new(ruleset(50))
        .register(SlowDetector)
        .register(ReplayDetector::new("yolo", detections("yolo", &[("Hunter", 0.8)])));

    let report = engine.assess_image(&[]).await;
    assert_eq!(report.threat_level, ThreatLevel::Low);
    assert_eq!(report.detection_counts.total, 1);
}

#[tokio::test]
async fn all_sources_failing_yields_empty_consensus() {
    let engine = DetectionEngine::new(ruleset(50)).register(BrokenDetector);

    let report = engine.identify_image(&[], None).await;
    assert!(report.results.is_empty());
    assert_eq!(report.failed_sources.len(), 1);
    assert_eq!(report.consensus.agreement, 0.0);
}

#[tokio::test]
async fn threshold_is_passed_to_detectors() {
    let engine = DetectionEngine::new(ruleset(1_000)).register(ReplayDetector::new(
        "yolo",
        detections("yolo", &[("Rifle", 0.2), ("Jeep", 0.6)]),
    ));

    let report = engine.assess_image(&[]).await;
    assert_eq!(report.threat_level, ThreatLevel::Low);
    assert_eq!(report.detection_counts.weapons, 0);
}
