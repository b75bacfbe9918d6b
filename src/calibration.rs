//! Raw model confidence to user-facing confidence.
//!
//! Calibration is `clamp(mean(raw) * boost, min_display, max_display)`, where
//! `boost` applies only to entities in the high-priority set. Without a policy
//! the mean is clamped to `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::aliases::alias_key;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,
    pub min_display: f32,
    pub max_display: f32,
    pub boost_factor: f32,
    pub high_priority: Vec<String>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_display: 0.60,
            max_display: 0.98,
            boost_factor: 1.5,
            high_priority: [
                "Bengal Tiger",
                "Asian Elephant",
                "Asiatic Lion",
                "Indian Leopard",
                "Snow Leopard",
                "Indian Rhinoceros",
                "Sloth Bear",
                "Dhole",
                "Indian Gaur",
                "Great Indian Hornbill",
                "Great Indian Bustard",
                "Indian Pangolin",
                "Gharial",
                "Red Panda",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Validated calibration parameters.
#[derive(Debug, Clone)]
pub struct CalibrationPolicy {
    min_display: f32,
    max_display: f32,
    boost_factor: f32,
    high_priority: HashSet<String>,
}

impl CalibrationPolicy {
    pub fn new(
        min_display: f32,
        max_display: f32,
        boost_factor: f32,
        high_priority: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&min_display)
            || !(0.0..=1.0).contains(&max_display)
            || min_display > max_display
        {
            return Err(ConfigError::Invalid(format!(
                "display bounds must satisfy 0 <= min ({min_display}) <= max ({max_display}) <= 1"
            )));
        }
        if !(boost_factor.is_finite() && boost_factor > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "boost_factor must be positive, got {boost_factor}"
            )));
        }

        Ok(Self {
            min_display,
            max_display,
            boost_factor,
            high_priority: high_priority
                .into_iter()
                .map(|name| alias_key(name.as_ref()))
                .collect(),
        })
    }

    /// `None` when calibration is switched off.
    pub fn from_config(config: &CalibrationConfig) -> Result<Option<Self>, ConfigError> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(
            config.min_display,
            config.max_display,
            config.boost_factor,
            &config.high_priority,
        )
        .map(Some)
    }

    pub fn is_high_priority(&self, entity_name: &str) -> bool {
        self.high_priority.contains(&alias_key(entity_name))
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.min_display, self.max_display)
    }
}

/// Arithmetic mean; an empty slice is 0.
pub fn mean(raw: &[f32]) -> f32 {
    if raw.is_empty() {
        return 0.0;
    }
    raw.iter().sum::<f32>() / raw.len() as f32
}

/// Calibrate the raw confidences of one consensus group.
pub fn calibrate(raw: &[f32], entity_name: &str, policy: Option<&CalibrationPolicy>) -> f32 {
    let base = mean(raw);
    match policy {
        None => base.clamp(0.0, 1.0),
        Some(policy) => {
            let boosted = if policy.is_high_priority(entity_name) {
                base * policy.boost_factor
            } else {
                base
            };
            boosted.clamp(policy.min_display, policy.max_display)
        }
    }
}
