use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::detectors::normalize::normalize_label;
use crate::error::ConfigError;

/// One canonical entity and the labels that should resolve to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl AliasEntry {
    pub fn new(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasConfig {
    pub entities: Vec<AliasEntry>,
    /// Shortest label allowed to match *inside* a longer alias.
    pub min_reverse_substring_len: usize,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            entities: default_entities(),
            min_reverse_substring_len: 3,
        }
    }
}

/// Wildlife vocabulary of the bundled classifiers mapped onto regional species.
pub fn default_entities() -> Vec<AliasEntry> {
    vec![
        AliasEntry::new("Bengal Tiger", &["tiger", "panthera tigris"]),
        AliasEntry::new(
            "Asian Elephant",
            &["elephant", "african elephant", "indian elephant", "tusker"],
        ),
        AliasEntry::new("Asiatic Lion", &["lion", "african lion"]),
        AliasEntry::new(
            "Indian Leopard",
            &["leopard", "panther", "black panther", "jaguar"],
        ),
        AliasEntry::new("Snow Leopard", &[]),
        AliasEntry::new("Indian Rhinoceros", &["rhinoceros", "rhino", "rinoceros"]),
        AliasEntry::new(
            "Sloth Bear",
            &["bear", "black bear", "brown bear", "american black bear"],
        ),
        AliasEntry::new("Dhole", &["wild dog", "african hunting dog"]),
        AliasEntry::new("Indian Gaur", &["gaur", "bison", "buffalo", "water buffalo", "ox"]),
        AliasEntry::new("Spotted Deer", &["deer", "chital", "impala", "gazelle"]),
        AliasEntry::new("Sambar Deer", &["sambar", "hartebeest"]),
        AliasEntry::new("Blackbuck", &["antelope"]),
        AliasEntry::new("Nilgiri Tahr", &["tahr", "bighorn", "goat"]),
        AliasEntry::new("Bonnet Macaque", &["macaque", "baboon", "monkey"]),
        AliasEntry::new("Gray Langur", &["langur"]),
        AliasEntry::new("Indian Peafowl", &["peacock", "peafowl"]),
        AliasEntry::new("Great Indian Bustard", &["bustard"]),
        AliasEntry::new("Crested Serpent Eagle", &["eagle"]),
        AliasEntry::new("Indian Eagle-Owl", &["owl"]),
        AliasEntry::new("Great Indian Hornbill", &["hornbill"]),
        AliasEntry::new("Greater Flamingo", &["flamingo"]),
        AliasEntry::new("Indian Cobra", &["cobra", "king cobra", "snake"]),
        AliasEntry::new(
            "Indian Rock Python",
            &["python", "rock python", "boa constrictor"],
        ),
        AliasEntry::new("Gharial", &["crocodile", "alligator"]),
        AliasEntry::new("Bengal Monitor Lizard", &["lizard", "monitor lizard"]),
        AliasEntry::new("Golden Jackal", &["jackal", "coyote"]),
        AliasEntry::new("Indian Wolf", &["wolf"]),
        AliasEntry::new("Bengal Fox", &["fox"]),
        AliasEntry::new("Striped Hyena", &["hyena"]),
        AliasEntry::new("Wild Boar", &["boar", "warthog"]),
        AliasEntry::new("Indian Pangolin", &["pangolin", "armadillo"]),
        AliasEntry::new("Indian Giant Squirrel", &["squirrel"]),
        AliasEntry::new("Fishing Cat", &["tabby"]),
        AliasEntry::new("Red Panda", &["panda"]),
        AliasEntry::new("Smooth-coated Otter", &["otter"]),
        AliasEntry::new("Indian Crested Porcupine", &["porcupine"]),
        AliasEntry::new("Indian Hare", &["hare"]),
        AliasEntry::new("Indian Hedgehog", &["hedgehog"]),
        AliasEntry::new("Rose-ringed Parakeet", &["parrot", "parakeet"]),
    ]
}

/// The authoritative name a label resolves to.
///
/// `resolved` is false for entities synthesized from an unmatched label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalEntity {
    pub name: String,
    pub aliases: BTreeSet<String>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Substring,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entity: CanonicalEntity,
    pub tier: MatchTier,
    pub matched_alias: Option<String>,
}

/// Compiled alias table with a deterministic match order.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entities: Vec<CanonicalEntity>,
    exact: HashMap<String, usize>,
    /// Longest alias first, then alphabetical.
    ordered: Vec<(String, usize)>,
    min_reverse_len: usize,
}

/// Case-folded, separator-normalized form used for every comparison.
pub fn alias_key(raw: &str) -> String {
    normalize_label(raw).to_lowercase()
}

/// Title case: upper after any non-letter, lower elsewhere.
///
/// Characters whose case mapping is not a single character (`ß`, `İ`) are
/// kept as written so the result title-cases to itself.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for c in raw.chars() {
        let mapped = if prev_alpha {
            single_char(c.to_lowercase())
        } else {
            single_char(c.to_uppercase())
        };
        out.push(mapped.unwrap_or(c));
        prev_alpha = c.is_alphabetic();
    }
    out
}

fn single_char(mut mapped: impl Iterator<Item = char>) -> Option<char> {
    match (mapped.next(), mapped.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

impl AliasTable {
    pub fn from_config(config: &AliasConfig) -> Result<Self, ConfigError> {
        let mut entities: Vec<CanonicalEntity> = Vec::with_capacity(config.entities.len());
        let mut exact: HashMap<String, usize> = HashMap::new();

        for entry in &config.entities {
            let name = normalize_label(&entry.name);
            if name.is_empty() {
                return Err(ConfigError::Invalid("alias entity with empty name".into()));
            }
            let index = entities.len();

            let mut aliases = BTreeSet::new();
            for alias in std::iter::once(&entry.name).chain(entry.aliases.iter()) {
                let key = alias_key(alias);
                if key.is_empty() {
                    continue;
                }
                if let Some(&other) = exact.get(&key)
                    && other != index
                {
                    return Err(ConfigError::Invalid(format!(
                        "alias '{}' maps to both '{}' and '{}'",
                        key, entities[other].name, name
                    )));
                }
                exact.insert(key.clone(), index);
                aliases.insert(key);
            }

            entities.push(CanonicalEntity {
                name,
                aliases,
                resolved: true,
            });
        }

        let mut ordered: Vec<(String, usize)> =
            exact.iter().map(|(k, v)| (k.clone(), *v)).collect();
        ordered.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });

        Ok(Self {
            entities,
            exact,
            ordered,
            min_reverse_len: config.min_reverse_substring_len,
        })
    }

    /// Resolve a free-text label. Never fails: unmatched labels fall through
    /// to an unresolved, title-cased entity.
    pub fn resolve(&self, raw_label: &str) -> Resolution {
        let key = alias_key(raw_label);
        if key.is_empty() {
            return self.fallback("unknown");
        }

        if let Some(&index) = self.exact.get(&key) {
            return Resolution {
                entity: self.entities[index].clone(),
                tier: MatchTier::Exact,
                matched_alias: Some(key),
            };
        }

        let key_len = key.chars().count();
        for (alias, index) in &self.ordered {
            let forward = key.contains(alias.as_str());
            let reverse = key_len >= self.min_reverse_len && alias.contains(key.as_str());
            if forward || reverse {
                debug!(label = raw_label, alias = %alias, entity = %self.entities[*index].name, "substring alias match");
                return Resolution {
                    entity: self.entities[*index].clone(),
                    tier: MatchTier::Substring,
                    matched_alias: Some(alias.clone()),
                };
            }
        }

        self.fallback(&key)
    }

    pub fn canonicalize(&self, raw_label: &str) -> CanonicalEntity {
        self.resolve(raw_label).entity
    }

    fn fallback(&self, key: &str) -> Resolution {
        Resolution {
            entity: CanonicalEntity {
                name: title_case(key),
                aliases: BTreeSet::from([key.to_string()]),
                resolved: false,
            },
            tier: MatchTier::Fallback,
            matched_alias: None,
        }
    }

    pub fn entities(&self) -> &[CanonicalEntity] {
        &self.entities
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::from_config(&AliasConfig::default()).unwrap_or_else(|_| Self {
            entities: Vec::new(),
            exact: HashMap::new(),
            ordered: Vec::new(),
            min_reverse_len: 3,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: Vec<AliasEntry>) -> AliasTable {
        AliasTable::from_config(&AliasConfig {
            entities: entries,
            min_reverse_substring_len: 3,
        })
        .unwrap()
    }

    #[test]
    fn default_table_compiles() {
        let table = AliasTable::default();
        assert!(table.entities().len() > 30);
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let table = AliasTable::default();
        let resolution = table.resolve("TUSKER");
        assert_eq!(resolution.tier, MatchTier::Exact);
        assert_eq!(resolution.entity.name, "Asian Elephant");
        assert!(resolution.entity.resolved);
    }

    #[test]
    fn canonical_name_resolves_to_itself() {
        let table = AliasTable::default();
        let resolution = table.resolve("Asian Elephant");
        assert_eq!(resolution.tier, MatchTier::Exact);
        assert_eq!(resolution.entity.name, "Asian Elephant");
    }

    #[test]
    fn substring_match_resolves_tiger_cat() {
        let table = table(vec![
            AliasEntry::new("Bengal Tiger", &["tiger"]),
            AliasEntry::new("Fishing Cat", &["cat"]),
        ]);
        let resolution = table.resolve("tiger cat");
        assert_eq!(resolution.tier, MatchTier::Substring);
        assert_eq!(resolution.entity.name, "Bengal Tiger");
        assert_eq!(resolution.matched_alias.as_deref(), Some("tiger"));
    }

    #[test]
    fn longest_alias_wins_over_table_order() {
        let table = table(vec![
            AliasEntry::new("Indian Gaur", &["ox"]),
            AliasEntry::new("Bengal Fox", &["fox"]),
        ]);
        assert_eq!(table.canonicalize("red fox").name, "Bengal Fox");
    }

    #[test]
    fn reverse_substring_needs_minimum_length() {
        let table = table(vec![AliasEntry::new("Asian Elephant", &["elephant"])]);
        assert_eq!(table.resolve("eleph").entity.name, "Asian Elephant");
        assert_eq!(table.resolve("el").tier, MatchTier::Fallback);
    }

    #[test]
    fn imagenet_style_labels_resolve() {
        let table = AliasTable::default();
        assert_eq!(table.canonicalize("African_elephant").name, "Asian Elephant");
        assert_eq!(table.canonicalize("tiger, Panthera tigris").name, "Bengal Tiger");
    }

    #[test]
    fn unknown_label_falls_back_to_title_case() {
        let table = AliasTable::default();
        let resolution = table.resolve("snow  goose");
        assert_eq!(resolution.tier, MatchTier::Fallback);
        assert_eq!(resolution.entity.name, "Snow Goose");
        assert!(!resolution.entity.resolved);
    }

    #[test]
    fn empty_label_falls_back_to_unknown() {
        let table = AliasTable::default();
        let entity = table.canonicalize("   ");
        assert_eq!(entity.name, "Unknown");
        assert!(!entity.resolved);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let table = AliasTable::default();
        for label in [
            "tiger cat",
            "elephant",
            "Asian Elephant",
            "snow goose",
            "x-bow",
            "American_black_bear",
            "",
        ] {
            let once = table.canonicalize(label);
            let twice = table.canonicalize(&once.name);
            assert_eq!(once, twice, "not idempotent for {label:?}");
        }
    }

    #[test]
    fn conflicting_aliases_are_rejected() {
        let err = AliasTable::from_config(&AliasConfig {
            entities: vec![
                AliasEntry::new("Dhole", &["dog"]),
                AliasEntry::new("Domestic Dog", &["Dog"]),
            ],
            min_reverse_substring_len: 3,
        })
        .unwrap_err();
        assert!(err.to_string().contains("'dog'"));
    }

    #[test]
    fn title_case_keeps_expanding_characters() {
        assert_eq!(title_case("ßeta"), "ßeta");
        assert_eq!(title_case("straße"), "Straße");
        assert_eq!(title_case("İzmir"), "İzmir");

        let table = AliasTable::default();
        for label in ["ßeta", "SSeta", "İzmir"] {
            let once = table.canonicalize(label);
            assert_eq!(table.canonicalize(&once.name), once, "not idempotent for {label:?}");
        }
    }

    #[test]
    fn title_case_capitalizes_words() {
        assert_eq!(title_case("x-bow"), "X-Bow");
        assert_eq!(title_case("snow goose"), "Snow Goose");
        assert_eq!(title_case("SLOTH bear"), "Sloth Bear");
    }
}
