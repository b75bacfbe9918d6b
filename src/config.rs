use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aliases::{AliasConfig, AliasTable};
use crate::calibration::{CalibrationConfig, CalibrationPolicy};
use crate::detectors::CategoryTable;
use crate::detectors::category::CategoryConfig;
use crate::error::ConfigError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "WILDSENSE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub categories: CategoryConfig,
    #[serde(default)]
    pub aliases: AliasConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub top_n: usize,
    pub min_prediction_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub timeout_ms: u64,
    pub confidence_threshold: f32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            min_prediction_confidence: 0.01,
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            confidence_threshold: 0.25,
        }
    }
}

impl EngineConfig {
    /// Load the first config file found, falling back to defaults.
    ///
    /// A file that exists but fails to parse is logged and ignored.
    pub fn load() -> Self {
        if let Some(path) = Self::config_file_path()
            && path.exists()
        {
            match Self::from_path(&path) {
                Ok(config) => return config,
                Err(e) => warn!(error = %e, "ignoring unreadable config, using defaults"),
            }
        }
        Self::default()
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// `$WILDSENSE_CONFIG`, else `<config_dir>/wildsense/config.toml`.
    pub fn config_file_path() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV)
            && !explicit.is_empty()
        {
            return Some(PathBuf::from(explicit));
        }
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("wildsense");
            path
        })
    }
}

/// Validated, compiled configuration shared by every component.
///
/// Built once and passed by reference (or `Arc`) into each call; nothing in
/// the engine reads configuration from anywhere else.
#[derive(Debug, Clone)]
pub struct Ruleset {
    pub categories: CategoryTable,
    pub aliases: AliasTable,
    pub calibration: Option<CalibrationPolicy>,
    pub consensus: ConsensusConfig,
    pub fanout: FanoutConfig,
}

impl Ruleset {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let consensus = config.consensus.clone();
        if consensus.top_n == 0 {
            return Err(ConfigError::Invalid("consensus.top_n must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&consensus.min_prediction_confidence) {
            return Err(ConfigError::Invalid(format!(
                "consensus.min_prediction_confidence must be within [0, 1], got {}",
                consensus.min_prediction_confidence
            )));
        }
        if !(0.0..=1.0).contains(&config.fanout.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "fanout.confidence_threshold must be within [0, 1], got {}",
                config.fanout.confidence_threshold
            )));
        }

        Ok(Self {
            categories: CategoryTable::from_config(&config.categories)?,
            aliases: AliasTable::from_config(&config.aliases)?,
            calibration: CalibrationPolicy::from_config(&config.calibration)?,
            consensus,
            fanout: config.fanout.clone(),
        })
    }

    pub fn shared(config: &EngineConfig) -> Result<Arc<Self>, ConfigError> {
        Self::from_config(config).map(Arc::new)
    }
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            categories: CategoryTable::default(),
            aliases: AliasTable::default(),
            calibration: CalibrationPolicy::from_config(&CalibrationConfig::default())
                .ok()
                .flatten(),
            consensus: ConsensusConfig::default(),
            fanout: FanoutConfig::default(),
        }
    }
}
