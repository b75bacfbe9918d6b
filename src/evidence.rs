use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::detectors::Category;

/// Per-category detection tallies as reported to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectionCounts {
    pub weapons: usize,
    pub humans: usize,
    pub vehicles: usize,
    pub protected_subjects: usize,
    pub unknown: usize,
    pub total: usize,
}

impl DetectionCounts {
    pub fn from_tally(counts: &BTreeMap<Category, usize>) -> Self {
        let get = |category: Category| counts.get(&category).copied().unwrap_or(0);
        Self {
            weapons: get(Category::Weapon),
            humans: get(Category::Human),
            vehicles: get(Category::Vehicle),
            protected_subjects: get(Category::ProtectedSubject),
            unknown: get(Category::Unknown),
            total: counts.values().sum(),
        }
    }

    /// Human-readable summary, e.g. `1 weapon(s) detected | 2 animal(s) detected`.
    ///
    /// Unknown detections are not threat evidence and are left out.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = [
            (self.weapons, "weapon(s)"),
            (self.humans, "human(s)"),
            (self.vehicles, "vehicle(s)"),
            (self.protected_subjects, "animal(s)"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, noun)| format!("{count} {noun} detected"))
        .collect();

        if parts.is_empty() {
            "No threats detected".to_string()
        } else {
            parts.join(" | ")
        }
    }
}
