use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::SCHEMA_VERSION;
use crate::consensus::ConsensusSummary;
use crate::error::SourceError;
use crate::knowledge::EnrichedRecord;

/// A detector that contributed nothing to the consensus, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub source_id: String,
    pub reason: String,
}

impl From<&SourceError> for SourceFailure {
    fn from(error: &SourceError) -> Self {
        Self {
            source_id: error.source_id().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Ranked, enriched identification plus how much the sources agreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationReport {
    pub results: Vec<EnrichedRecord>,
    #[serde(flatten)]
    pub consensus: ConsensusSummary,
    #[serde(default)]
    pub failed_sources: Vec<SourceFailure>,
    pub version: String,
}

impl IdentificationReport {
    pub fn new(
        results: Vec<EnrichedRecord>,
        consensus: ConsensusSummary,
        failed_sources: Vec<SourceFailure>,
    ) -> Self {
        Self {
            results,
            consensus,
            failed_sources,
            version: SCHEMA_VERSION.to_string(),
        }
    }

    pub fn top(&self) -> Option<&EnrichedRecord> {
        self.results.first()
    }
}
