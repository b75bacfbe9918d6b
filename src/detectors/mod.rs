use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub mod category;
pub mod normalize;
pub mod test_utils;

pub use category::{Category, CategorizedDetection, CategoryTable};

/// Axis-aligned box as `[x1, y1, x2, y2]` in detector pixel space.
pub type BoundingBox = [f32; 4];

/// One labelled, scored box reported by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    pub source_id: String,
}

impl RawDetection {
    pub fn new(
        label: impl Into<String>,
        confidence: f32,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            confidence,
            bounding_box: [0.0; 4],
            source_id: source_id.into(),
        }
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }
}

/// External inference backend. Implementations must not block indefinitely;
/// the engine still applies its own per-source timeout.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(
        &self,
        image: &[u8],
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>, SourceError>;
}

/// Serves detections that were recorded earlier, filtered by the threshold
/// like a live backend would.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    name: String,
    detections: Vec<RawDetection>,
}

impl ReplayDetector {
    pub fn new(name: impl Into<String>, detections: Vec<RawDetection>) -> Self {
        Self {
            name: name.into(),
            detections,
        }
    }
}

#[async_trait]
impl Detector for ReplayDetector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(
        &self,
        _image: &[u8],
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>, SourceError> {
        let mut detections: Vec<RawDetection> = self
            .detections
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .cloned()
            .collect();
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(detections)
    }
}
