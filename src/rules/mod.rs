//! Rule-set resource.
//!
//! A rule set is a versioned JSON document listing pattern rules in
//! declaration order:
//!
//! ```json
//! {
//!   "version": 1,
//!   "rules": [
//!     {
//!       "collection": "payment_card",
//!       "pattern": "\\b((?:\\d{4} ?){3}\\d{4})\\b",
//!       "enabled_phases": ["selection", "classification", "annotation"],
//!       "target_score": 1.0,
//!       "verification": { "kind": "luhn", "group": 1 },
//!       "capturing_groups": [
//!         {},
//!         { "extend_selection": true, "entity_field_path": "payment_card.number" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `capturing_groups[i]` describes regex group `i` (group 0 is the whole
//! match). The schema is deserialized here and compiled by
//! `engine::CompiledRules::compile`, which is where pattern and group errors
//! surface.

use crate::engine::VerificationKind;
use crate::error::{Error, Result};
use crate::{Phase, PhaseSet};
use serde::{Deserialize, Serialize};
use std::path::Path;


/// Schema version understood by this crate.
pub const RULE_SET_VERSION: u32 = 1;

static BUNDLED_RULES: &str = include_str!("default_rules.json");

/// A versioned, ordered collection of rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: u32,
    /// Free-form data revision, reported in logs.
    #[serde(default)]
    pub revision: Option<String>,
    pub rules: Vec<RuleSpec>,
}

/// Declarative description of one pattern rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub collection: String,
    pub pattern: String,
    pub enabled_phases: Vec<Phase>,
    pub target_score: f32,
    /// Falls back to `target_score`.
    #[serde(default)]
    pub priority_score: Option<f32>,
    #[serde(default)]
    pub verification: Option<VerificationSpec>,
    #[serde(default)]
    pub capturing_groups: Vec<GroupSpec>,
    /// Language tags this rule is restricted to; empty means any.
    #[serde(default)]
    pub locales: Vec<String>,
    /// Coarse input features the rule needs before it is worth running.
    #[serde(default)]
    pub buckets: Vec<Bucket>,
}

impl RuleSpec {
    pub fn phases(&self) -> PhaseSet {
        self.enabled_phases.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSpec {
    pub kind: VerificationKind,
    /// Group whose text is verified.
    #[serde(default)]
    pub group: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub extend_selection: bool,
    /// Dotted path into the entity payload, e.g. `"phone.area_code"`.
    #[serde(default)]
    pub entity_field_path: Option<String>,
    #[serde(default)]
    pub normalization: Vec<Normalization>,
}

/// Codepoint-wise rewrites applied to captured text before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    Lowercase,
    Uppercase,
    DropWhitespace,
    DropPunctuation,
}

impl Normalization {
    pub fn apply_all(steps: &[Normalization], text: &str) -> String {
        steps.iter().fold(text.to_string(), |acc, step| step.apply(&acc))
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            Normalization::Lowercase => text.to_lowercase(),
            Normalization::Uppercase => text.to_uppercase(),
            Normalization::DropWhitespace => text.chars().filter(|c| !c.is_whitespace()).collect(),
            Normalization::DropPunctuation => text.chars().filter(|c| !c.is_ascii_punctuation()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Digits,
    AtSign,
    Colon,
    Slash,
}

impl RuleSet {
    /// Parse and version-check a JSON rule set.
    pub fn from_json(json: &str) -> Result<Self> {
        let set: RuleSet = serde_json::from_str(json)?;
        if set.version != RULE_SET_VERSION {
            return Err(Error::UnsupportedRuleSetVersion { found: set.version, supported: RULE_SET_VERSION });
        }
        tracing::debug!(rules = set.rules.len(), revision = ?set.revision, "loaded rule set");
        Ok(set)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&json)
    }

    /// The rule set shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_RULES)
    }
}
