//! Threat scoring as a declarative rule table.
//!
//! Each [`ThreatRule`] whose precondition holds emits a [`Candidate`]. The
//! verdict takes level and score from the highest-scoring candidate (earliest
//! declared rule on ties) and the text from every matched rule, in rule order.
//! Nothing is overwritten while rules are evaluated, so a later rule can never
//! downgrade an earlier one.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::detectors::category::tally;
use crate::detectors::{CategorizedDetection, Category, RawDetection};

/// Ordered severity, `None < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::None => "none",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

/// When a rule's precondition holds.
#[derive(Debug, Clone, Copy)]
pub enum Precondition {
    /// Every listed category has at least one detection.
    AllOf(&'static [Category]),
    /// At least one listed category has a detection.
    AnyOf(&'static [Category]),
}

impl Precondition {
    fn holds(&self, context: &RuleContext<'_>) -> bool {
        match self {
            Precondition::AllOf(categories) => categories.iter().all(|c| context.has(*c)),
            Precondition::AnyOf(categories) => categories.iter().any(|c| context.has(*c)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Always,
    /// Fallback rule, considered only when no earlier rule matched.
    OnlyIfUnmatched,
}

/// Text contributed by one matched rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragments {
    pub activities: Vec<String>,
    pub suspicious_objects: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub rule: &'static str,
    pub level: ThreatLevel,
    pub score: f32,
    pub fragments: Fragments,
}

/// Detections of one request, grouped by category.
pub struct RuleContext<'a> {
    by_category: BTreeMap<Category, Vec<&'a RawDetection>>,
}

impl<'a> RuleContext<'a> {
    pub fn new(detections: &'a [CategorizedDetection]) -> Self {
        let mut by_category: BTreeMap<Category, Vec<&'a RawDetection>> = BTreeMap::new();
        for categorized in detections {
            by_category
                .entry(categorized.category)
                .or_default()
                .push(&categorized.detection);
        }
        Self { by_category }
    }

    pub fn has(&self, category: Category) -> bool {
        self.count(category) > 0
    }

    pub fn count(&self, category: Category) -> usize {
        self.by_category.get(&category).map_or(0, Vec::len)
    }

    pub fn of(&self, category: Category) -> &[&'a RawDetection] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub struct ThreatRule {
    pub name: &'static str,
    pub level: ThreatLevel,
    pub score: f32,
    pub precondition: Precondition,
    pub scope: RuleScope,
    pub fragments: fn(&RuleContext<'_>) -> Fragments,
}

impl ThreatRule {
    fn candidate(&self, context: &RuleContext<'_>) -> Candidate {
        Candidate {
            rule: self.name,
            level: self.level,
            score: self.score,
            fragments: (self.fragments)(context),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn armed_presence(context: &RuleContext<'_>) -> Fragments {
    Fragments {
        activities: strings(&["Armed presence detected"]),
        suspicious_objects: context
            .of(Category::Weapon)
            .iter()
            .map(|d| format!("{} (confidence: {:.0}%)", d.label, d.confidence * 100.0))
            .collect(),
        recommendations: strings(&[
            "IMMEDIATE ACTION: Contact wildlife authorities immediately",
            "Do not approach - armed individuals may be dangerous",
            "Preserve evidence and GPS coordinates",
        ]),
    }
}

fn weapons_near_wildlife(context: &RuleContext<'_>) -> Fragments {
    Fragments {
        activities: vec![format!(
            "Weapons near wildlife ({} animals detected)",
            context.count(Category::ProtectedSubject)
        )],
        suspicious_objects: Vec::new(),
        recommendations: strings(&[
            "CRITICAL: Active poaching threat - wildlife in immediate danger",
        ]),
    }
}

fn human_with_vehicles(context: &RuleContext<'_>) -> Fragments {
    Fragments {
        activities: strings(&["Unauthorized human activity with vehicles"]),
        suspicious_objects: context
            .of(Category::Vehicle)
            .iter()
            .map(|d| d.label.clone())
            .collect(),
        recommendations: strings(&[
            "Check vehicle registration and authorization",
            "Document location and time",
        ]),
    }
}

fn human_near_wildlife(context: &RuleContext<'_>) -> Fragments {
    Fragments {
        activities: vec![format!(
            "Human presence near {} animals",
            context.count(Category::ProtectedSubject)
        )],
        suspicious_objects: Vec::new(),
        recommendations: strings(&[
            "Monitor for suspicious behavior",
            "Verify if person has valid permits",
        ]),
    }
}

fn possible_entry(_context: &RuleContext<'_>) -> Fragments {
    Fragments {
        activities: strings(&["Possible unauthorized entry"]),
        suspicious_objects: Vec::new(),
        recommendations: strings(&[
            "Verify authorization to be in the area",
            "Log the incident for patrol review",
        ]),
    }
}

/// Escalation rules in priority order.
pub const RULES: &[ThreatRule] = &[
    ThreatRule {
        name: "armed_presence",
        level: ThreatLevel::Critical,
        score: 0.95,
        precondition: Precondition::AllOf(&[Category::Weapon]),
        scope: RuleScope::Always,
        fragments: armed_presence,
    },
    ThreatRule {
        name: "weapons_near_wildlife",
        level: ThreatLevel::Critical,
        score: 0.98,
        precondition: Precondition::AllOf(&[Category::Weapon, Category::ProtectedSubject]),
        scope: RuleScope::Always,
        fragments: weapons_near_wildlife,
    },
    ThreatRule {
        name: "human_with_vehicles",
        level: ThreatLevel::High,
        score: 0.85,
        precondition: Precondition::AllOf(&[Category::Human, Category::Vehicle]),
        scope: RuleScope::Always,
        fragments: human_with_vehicles,
    },
    ThreatRule {
        name: "human_near_wildlife",
        level: ThreatLevel::Medium,
        score: 0.70,
        precondition: Precondition::AllOf(&[Category::Human, Category::ProtectedSubject]),
        scope: RuleScope::Always,
        fragments: human_near_wildlife,
    },
    ThreatRule {
        name: "possible_entry",
        level: ThreatLevel::Low,
        score: 0.50,
        precondition: Precondition::AnyOf(&[Category::Human, Category::Vehicle]),
        scope: RuleScope::OnlyIfUnmatched,
        fragments: possible_entry,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreatAssessment {
    pub level: ThreatLevel,
    pub score: f32,
    pub activities: Vec<String>,
    pub suspicious_objects: Vec<String>,
    pub recommendations: Vec<String>,
    pub counts: BTreeMap<Category, usize>,
    /// Names of every rule whose precondition held, in rule order.
    pub matched_rules: Vec<String>,
}

impl ThreatAssessment {
    pub fn threat_detected(&self) -> bool {
        self.level != ThreatLevel::None
    }
}

/// Every candidate the rule table emits for these detections.
pub fn candidates(rules: &[ThreatRule], detections: &[CategorizedDetection]) -> Vec<Candidate> {
    let context = RuleContext::new(detections);
    let mut matched: Vec<Candidate> = Vec::new();

    for rule in rules {
        if rule.scope == RuleScope::OnlyIfUnmatched && !matched.is_empty() {
            continue;
        }
        if rule.precondition.holds(&context) {
            matched.push(rule.candidate(&context));
        }
    }

    matched
}

/// Evaluate the default rule table.
pub fn assess(detections: &[CategorizedDetection]) -> ThreatAssessment {
    assess_with(RULES, detections)
}

pub fn assess_with(rules: &[ThreatRule], detections: &[CategorizedDetection]) -> ThreatAssessment {
    let matched = candidates(rules, detections);

    let mut winner: Option<&Candidate> = None;
    for candidate in &matched {
        if winner.is_none_or(|best| candidate.score > best.score) {
            winner = Some(candidate);
        }
    }
    let (level, score) = winner.map_or((ThreatLevel::None, 0.0), |w| (w.level, w.score));

    let mut assessment = ThreatAssessment {
        level,
        score,
        activities: Vec::new(),
        suspicious_objects: Vec::new(),
        recommendations: Vec::new(),
        counts: tally(detections),
        matched_rules: Vec::new(),
    };
    for candidate in matched {
        assessment.matched_rules.push(candidate.rule.to_string());
        let Fragments {
            activities,
            suspicious_objects,
            recommendations,
        } = candidate.fragments;
        assessment.activities.extend(activities);
        assessment.suspicious_objects.extend(suspicious_objects);
        assessment.recommendations.extend(recommendations);
    }

    debug!(
        level = level.as_str(),
        score,
        rules = ?assessment.matched_rules,
        detections = detections.len(),
        "threat assessed"
    );

    assessment
}
