//! Knowledge store lookups and enrichment of consensus results.
//!
//! Enrichment never fails: a miss, an unavailable store, or an entity the
//! canonicalizer could not resolve all produce a stub record with
//! `enriched = false`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::consensus::ConsensusResult;
use crate::error::KnowledgeError;

const PENDING: &str = "Classification pending";
const UNKNOWN: &str = "Unknown";

/// Reference metadata for one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeRecord {
    #[serde(alias = "species_name")]
    pub species_name: String,
    #[serde(alias = "scientific_name")]
    pub scientific_name: String,
    #[serde(alias = "conservation_status")]
    pub conservation_status: String,
    #[serde(default)]
    pub population: String,
    #[serde(default)]
    pub habitat: String,
    #[serde(default)]
    pub threats: Vec<String>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

/// External reference database.
pub trait KnowledgeStore: Send + Sync {
    /// `Ok(None)` is a miss. Stores may match case-insensitively or partially.
    fn lookup(&self, name: &str) -> Result<Option<KnowledgeRecord>, KnowledgeError>;
}

/// Records held in memory, optionally loaded from a JSON array.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKnowledgeStore {
    records: Vec<KnowledgeRecord>,
}

impl InMemoryKnowledgeStore {
    pub fn from_records(records: Vec<KnowledgeRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, KnowledgeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KnowledgeError::Unavailable(format!("failed to read {}: {}", path.display(), e))
        })?;
        let records: Vec<KnowledgeRecord> = serde_json::from_str(&content).map_err(|e| {
            KnowledgeError::Unavailable(format!("failed to parse {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), records = records.len(), "loaded knowledge store");
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KnowledgeStore for InMemoryKnowledgeStore {
    fn lookup(&self, name: &str) -> Result<Option<KnowledgeRecord>, KnowledgeError> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let found = self
            .records
            .iter()
            .find(|r| r.species_name.to_lowercase() == needle)
            .or_else(|| {
                self.records
                    .iter()
                    .find(|r| r.scientific_name.to_lowercase() == needle)
            })
            .or_else(|| {
                self.records
                    .iter()
                    .find(|r| r.species_name.to_lowercase().contains(&needle))
            });

        Ok(found.cloned())
    }
}

/// The descriptive half of an [`EnrichedRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentDetails {
    pub scientific_name: String,
    pub conservation_status: String,
    pub population: String,
    pub habitat: String,
    pub threats: Vec<String>,
    pub region: String,
    pub category: String,
    pub description: String,
    pub enriched: bool,
}

impl EnrichmentDetails {
    pub fn stub() -> Self {
        Self {
            scientific_name: PENDING.to_string(),
            conservation_status: UNKNOWN.to_string(),
            population: UNKNOWN.to_string(),
            habitat: UNKNOWN.to_string(),
            threats: vec![UNKNOWN.to_string()],
            region: UNKNOWN.to_string(),
            category: UNKNOWN.to_string(),
            description: PENDING.to_string(),
            enriched: false,
        }
    }
}

impl From<KnowledgeRecord> for EnrichmentDetails {
    fn from(record: KnowledgeRecord) -> Self {
        Self {
            scientific_name: record.scientific_name,
            conservation_status: record.conservation_status,
            population: record.population,
            habitat: record.habitat,
            threats: record.threats,
            region: record.region,
            category: record.category,
            description: record.description,
            enriched: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub result: ConsensusResult,
    #[serde(flatten)]
    pub details: EnrichmentDetails,
}

pub struct Enricher<'a> {
    store: Option<&'a dyn KnowledgeStore>,
}

impl<'a> Enricher<'a> {
    pub fn new(store: &'a dyn KnowledgeStore) -> Self {
        Self { store: Some(store) }
    }

    /// Enricher that always yields stubs.
    pub fn offline() -> Self {
        Self { store: None }
    }

    /// Look up one entity. Unresolved entities are not sent to the store.
    pub fn details_for(&self, entity_name: &str, resolved: bool) -> EnrichmentDetails {
        let Some(store) = self.store else {
            return EnrichmentDetails::stub();
        };
        if !resolved {
            debug!(entity = entity_name, "unresolved entity, skipping lookup");
            return EnrichmentDetails::stub();
        }

        match store.lookup(entity_name) {
            Ok(Some(record)) => {
                debug!(entity = entity_name, species = %record.species_name, "knowledge hit");
                record.into()
            }
            Ok(None) => {
                debug!(entity = entity_name, "knowledge miss");
                EnrichmentDetails::stub()
            }
            Err(e) => {
                warn!(entity = entity_name, error = %e, "knowledge lookup failed, using stub");
                EnrichmentDetails::stub()
            }
        }
    }

    pub fn enrich(&self, result: ConsensusResult) -> EnrichedRecord {
        let details = self.details_for(&result.entity_name, result.resolved);
        EnrichedRecord { result, details }
    }

    pub fn enrich_all(&self, results: Vec<ConsensusResult>) -> Vec<EnrichedRecord> {
        results.into_iter().map(|r| self.enrich(r)).collect()
    }
}
