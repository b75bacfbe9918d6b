//! Turns heterogeneous detector payloads into [`RawDetection`]s.
//!
//! Object detectors report `{class, confidence, bbox}`, image classifiers
//! report `{species, confidence, model}` (some as `confidencePercent`), and
//! recorded requests use the camelCase `RawDetection` shape. All of them
//! end up here.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::{BoundingBox, RawDetection};
use crate::error::EngineError;

/// Confidence assumed when an upstream item carries none.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Keys under which services nest their detection list.
const LIST_KEYS: [&str; 3] = ["detections", "predictions", "results"];

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_]+").expect("separator pattern is valid"));

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(alias = "class", alias = "species")]
    label: Option<String>,
    confidence: Option<f64>,
    #[serde(rename = "confidencePercent", alias = "confidence_percent")]
    confidence_percent: Option<f64>,
    #[serde(rename = "boundingBox", alias = "bbox", alias = "bounding_box")]
    bounding_box: Option<Vec<f64>>,
    #[serde(rename = "sourceId", alias = "source_id", alias = "model", alias = "source")]
    source_id: Option<String>,
}

/// Collapse underscores and runs of whitespace, as classifier vocabularies
/// use both (`African_elephant`).
pub fn normalize_label(raw: &str) -> String {
    SEPARATORS.replace_all(raw.trim(), " ").trim().to_string()
}

/// Clamp an upstream confidence onto `[0, 1]`. NaN becomes 0.
pub fn normalize_confidence(raw: f64) -> f32 {
    if raw.is_nan() {
        warn!(confidence = raw, "NaN confidence replaced with 0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&raw) {
        warn!(confidence = raw, "confidence out of range, clamping");
    }
    raw.clamp(0.0, 1.0) as f32
}

/// Read an explicit `confidencePercent` value (0 to 100).
pub fn normalize_percent(raw: f64) -> f32 {
    normalize_confidence(raw / 100.0)
}

fn normalize_box(raw: Option<Vec<f64>>) -> BoundingBox {
    match raw {
        Some(coords) if coords.len() == 4 => [
            coords[0] as f32,
            coords[1] as f32,
            coords[2] as f32,
            coords[3] as f32,
        ],
        Some(coords) => {
            warn!(len = coords.len(), "bounding box ignored, expected 4 coordinates");
            [0.0; 4]
        }
        None => [0.0; 4],
    }
}

/// Normalize one item. Returns `None` for items that cannot name anything.
pub fn normalize_item(value: &Value, default_source: &str) -> Option<RawDetection> {
    let item: RawItem = match serde_json::from_value(value.clone()) {
        Ok(item) => item,
        Err(e) => {
            warn!(error = %e, "skipping malformed detection");
            return None;
        }
    };

    let label = normalize_label(item.label.as_deref().unwrap_or_default());
    if label.is_empty() {
        warn!(source = default_source, "skipping detection without a label");
        return None;
    }

    let confidence = match (item.confidence, item.confidence_percent) {
        (Some(fraction), _) => normalize_confidence(fraction),
        (None, Some(percent)) => normalize_percent(percent),
        (None, None) => DEFAULT_CONFIDENCE,
    };

    let source_id = item
        .source_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_source.to_string());

    Some(RawDetection {
        label,
        confidence,
        bounding_box: normalize_box(item.bounding_box),
        source_id,
    })
}

/// Normalize a detection list, or an object wrapping one.
///
/// A payload with no list at all is the one structural error callers see.
pub fn normalize_batch(payload: &Value, default_source: &str) -> Result<Vec<RawDetection>, EngineError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(map) => LIST_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .ok_or_else(|| {
                EngineError::InvalidRequest(format!(
                    "expected a detection list or an object with one of: {}",
                    LIST_KEYS.join(", ")
                ))
            })?,
        Value::Null => {
            return Err(EngineError::InvalidRequest(
                "detection list is required".to_string(),
            ));
        }
        other => {
            return Err(EngineError::InvalidRequest(format!(
                "expected a detection list, got {}",
                json_type(other)
            )));
        }
    };

    let detections: Vec<RawDetection> = items
        .iter()
        .filter_map(|item| normalize_item(item, default_source))
        .collect();

    debug!(
        source = default_source,
        received = items.len(),
        kept = detections.len(),
        "normalized detections"
    );

    Ok(detections)
}

/// Split a payload into per-source detection lists.
///
/// `{"sources": {"custom": [...], "mobilenet": [...]}}` yields one entry per
/// source; anything else is a single batch attributed to `default_source`.
pub fn normalize_sources(
    payload: &Value,
    default_source: &str,
) -> Result<Vec<(String, Vec<RawDetection>)>, EngineError> {
    let Some(sources) = payload.get("sources") else {
        return Ok(vec![(
            default_source.to_string(),
            normalize_batch(payload, default_source)?,
        )]);
    };

    let sources = sources.as_object().ok_or_else(|| {
        EngineError::InvalidRequest("'sources' must map source ids to detection lists".into())
    })?;

    sources
        .iter()
        .map(|(source_id, batch)| Ok((source_id.clone(), normalize_batch(batch, source_id)?)))
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
