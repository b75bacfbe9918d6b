use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::RawDetection;
use crate::aliases::alias_key;
use crate::error::ConfigError;

/// Semantic bucket a detector label falls into.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Weapon,
    Human,
    Vehicle,
    ProtectedSubject,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Weapon,
        Category::Human,
        Category::Vehicle,
        Category::ProtectedSubject,
        Category::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Weapon => "weapon",
            Category::Human => "human",
            Category::Vehicle => "vehicle",
            Category::ProtectedSubject => "protected_subject",
            Category::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedDetection {
    #[serde(flatten)]
    pub detection: RawDetection,
    pub category: Category,
}

/// Label sets for each category, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub weapons: Vec<String>,
    pub humans: Vec<String>,
    pub vehicles: Vec<String>,
    pub protected_subjects: Vec<String>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            weapons: to_owned(DEFAULT_WEAPONS),
            humans: to_owned(DEFAULT_HUMANS),
            vehicles: to_owned(DEFAULT_VEHICLES),
            protected_subjects: to_owned(DEFAULT_PROTECTED_SUBJECTS),
        }
    }
}

fn to_owned(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

pub const DEFAULT_WEAPONS: &[&str] = &["Knife", "Pistol", "Rifle", "Crossbow", "X-Bow", "Rope"];

pub const DEFAULT_HUMANS: &[&str] = &["Hunter"];

pub const DEFAULT_VEHICLES: &[&str] = &["Car", "Jeep", "Truck", "Van", "Helicopter", "Bike"];

/// Species the poaching model was trained to recognise.
pub const DEFAULT_PROTECTED_SUBJECTS: &[&str] = &[
    "Antelope",
    "Badger",
    "Bat",
    "Bear",
    "Bison",
    "Boar",
    "Cheetah",
    "Chimpanzee",
    "Coyote",
    "Deer",
    "Dog",
    "Donkey",
    "Duck",
    "Eagle",
    "Elephant",
    "Flamingo",
    "Fox",
    "Giraffe",
    "Goat",
    "Goose",
    "Gorilla",
    "Hare",
    "Hedgehog",
    "Hippopotamus",
    "Hornbill",
    "Horse",
    "Humming Bird",
    "Hyena",
    "Kangaroo",
    "Koala",
    "Leopard",
    "Lion",
    "Lizard",
    "Mouse",
    "Okapi",
    "Orangutan",
    "Otter",
    "Owl",
    "Ox",
    "Panda",
    "Parrot",
    "Pig",
    "Pigeon",
    "Porcupine",
    "Possum",
    "Raccoon",
    "Reindeer",
    "Rinoceros",
    "Sandpiper",
    "Sheep",
    "Snake",
    "Sparrow",
    "Squirrel",
    "Tiger",
    "Turkey",
    "Wolf",
    "Wombat",
    "Woodpecker",
    "Zebra",
];

/// Compiled, case-insensitive membership table.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    members: HashMap<String, Category>,
}

impl CategoryTable {
    /// Build the table, rejecting a label that appears in two categories.
    pub fn from_config(config: &CategoryConfig) -> Result<Self, ConfigError> {
        let mut members = HashMap::new();
        let sets = [
            (Category::Weapon, &config.weapons),
            (Category::Human, &config.humans),
            (Category::Vehicle, &config.vehicles),
            (Category::ProtectedSubject, &config.protected_subjects),
        ];

        for (category, labels) in sets {
            for label in labels {
                let key = alias_key(label);
                if key.is_empty() {
                    continue;
                }
                if let Some(existing) = members.insert(key, category)
                    && existing != category
                {
                    return Err(ConfigError::Invalid(format!(
                        "label '{}' is listed as both {} and {}",
                        label,
                        existing.as_str(),
                        category.as_str()
                    )));
                }
            }
        }

        Ok(Self { members })
    }

    pub fn classify(&self, label: &str) -> Category {
        self.members
            .get(&alias_key(label))
            .copied()
            .unwrap_or(Category::Unknown)
    }

    pub fn categorize(&self, detections: &[RawDetection]) -> Vec<CategorizedDetection> {
        detections
            .iter()
            .map(|detection| CategorizedDetection {
                category: self.classify(&detection.label),
                detection: detection.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::from_config(&CategoryConfig::default())
            .unwrap_or_else(|_| Self { members: HashMap::new() })
    }
}

/// Raw per-category tallies; every category is present, zero or not.
pub fn tally(detections: &[CategorizedDetection]) -> BTreeMap<Category, usize> {
    let mut counts: BTreeMap<Category, usize> = Category::ALL.iter().map(|c| (*c, 0)).collect();
    for detection in detections {
        *counts.entry(detection.category).or_default() += 1;
    }
    counts
}
