use std::path::PathBuf;
use thiserror::Error;

/// Caller-visible failures. Everything else degrades inside the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A single detector failing during fan-out. Recorded, never propagated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("source {source_id} timed out after {after_ms}ms")]
    Timeout { source_id: String, after_ms: u64 },
    #[error("source {source_id} failed: {reason}")]
    Failed { source_id: String, reason: String },
}

impl SourceError {
    pub fn source_id(&self) -> &str {
        match self {
            SourceError::Timeout { source_id, .. } | SourceError::Failed { source_id, .. } => {
                source_id
            }
        }
    }
}

/// Knowledge store failures. Enrichment turns these into stub records.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KnowledgeError {
    #[error("knowledge store unavailable: {0}")]
    Unavailable(String),
    #[error("knowledge store lookup timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
