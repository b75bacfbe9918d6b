use crate::consensus::Prediction;
use crate::detectors::RawDetection;

/// Build detections from a single source for tests
///
/// This is a shared utility used across unit and integration tests so that
/// fixtures read like the scenarios they describe.
///
/// # Example
///
/// ```rust
/// use wildsense::detectors::test_utils::detections;
///
/// let batch = detections("yolo", &[("Rifle", 0.9), ("Deer", 0.8)]);
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch[0].source_id, "yolo");
/// ```
pub fn detections(source_id: &str, items: &[(&str, f32)]) -> Vec<RawDetection> {
    items
        .iter()
        .map(|(label, confidence)| RawDetection::new(*label, *confidence, source_id))
        .collect()
}

/// Build classifier predictions as `(label, confidence, source)` triples
///
/// # Example
///
/// ```rust
/// use wildsense::detectors::test_utils::predictions;
///
/// let batch = predictions(&[("elephant", 0.7, "custom"), ("Asian Elephant", 0.6, "mobilenet")]);
/// assert_eq!(batch[1].source_id, "mobilenet");
/// ```
pub fn predictions(items: &[(&str, f32, &str)]) -> Vec<Prediction> {
    items
        .iter()
        .map(|(label, confidence, source)| Prediction::new(*label, *confidence, *source))
        .collect()
}
