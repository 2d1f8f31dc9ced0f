//! Rule compilation and indexing.
//!
//! This module holds the *static* side of the engine: structures derived from
//! a [`RuleSet`] once, at pipeline construction, and shared read-only by every
//! request afterwards.
//!
//! Work is split into two phases:
//!
//! 1. **Compile/index rules** (this module): compile every pattern, validate
//!    group references against the compiled regex, and index rules by phase.
//!    Each pattern is also compiled anchored (`\A(?:...)\z`) so a caller's
//!    span can be checked as a whole; wrapping in a non-capturing group keeps
//!    group numbers identical.
//! 2. **Run** (see `matcher.rs`): scan the context for coarse triggers
//!    (`trigger.rs`), walk the rules of the requested phase in declaration
//!    order and turn matches into candidates.
//!
//! ## Invariants
//!
//! - `RuleId` is an index into `CompiledRules::rules`.
//! - `RuleIndex::by_phase[p]` lists rule ids in declaration order; the
//!   matcher relies on that for reproducible output.
//! - Every group index a rule refers to (bindings and verification) exists
//!   in its regex. Violations are rejected here, never at match time.

use super::verify::VerificationKind;
use crate::error::{Error, Result};
use crate::rules::{Bucket, Normalization, RuleSet};
use crate::{Phase, PhaseSet};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::sync::Arc;

/// Rule identifier (index into the rules vector).
pub(crate) type RuleId = usize;

const PHASE_COUNT: usize = 3;

bitflags::bitflags! {
    /// Coarse input features used to skip rules that cannot match.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BucketMask: u32 {
        const HAS_DIGITS = 1 << 0;
        const HAS_AT     = 1 << 1;
        const HAS_COLON  = 1 << 2;
        const HAS_SLASH  = 1 << 3;
    }
}

impl From<Bucket> for BucketMask {
    fn from(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Digits => BucketMask::HAS_DIGITS,
            Bucket::AtSign => BucketMask::HAS_AT,
            Bucket::Colon => BucketMask::HAS_COLON,
            Bucket::Slash => BucketMask::HAS_SLASH,
        }
    }
}

/// Post-match check bound to one capturing group.
#[derive(Debug, Clone, Copy)]
pub struct Verification {
    pub kind: VerificationKind,
    pub group: usize,
}

/// Binding for one capturing group.
#[derive(Debug, Clone, Default)]
pub struct CapturingGroup {
    pub extend_selection: bool,
    /// Path segments into the entity payload.
    pub entity_field_path: Option<Vec<String>>,
    pub normalization: Vec<Normalization>,
}

/// A rule ready to run.
#[derive(Debug)]
pub struct CompiledRule {
    pub collection: String,
    pub regex: Regex,
    /// `regex` anchored at both ends, for matching a whole span.
    pub anchored: Regex,
    pub phases: PhaseSet,
    pub target_score: f32,
    pub priority_score: f32,
    pub verification: Option<Verification>,
    /// Indexed by group number; may be shorter than the regex group count.
    pub groups: Vec<CapturingGroup>,
    pub locales: Vec<String>,
    pub buckets: BucketMask,
}

impl CompiledRule {
    /// True when at least one group narrows the selection.
    pub fn extends_selection(&self) -> bool {
        self.groups.iter().any(|g| g.extend_selection)
    }
}

#[derive(Default, Debug)]
pub struct RuleIndex {
    pub by_phase: [Vec<RuleId>; PHASE_COUNT],
}

/// Pre-compiled rule set with its phase index.
#[derive(Debug)]
pub struct CompiledRules {
    pub rules: Vec<CompiledRule>,
    pub index: RuleIndex,
    pub revision: Option<String>,
}

static BUNDLED: OnceCell<Arc<CompiledRules>> = OnceCell::new();

impl CompiledRules {
    /// Compile every rule of `set`.
    ///
    /// Fails on the first pattern that does not compile or that references a
    /// capturing group its regex does not have.
    pub fn compile(set: &RuleSet) -> Result<Self> {
        let mut rules = Vec::with_capacity(set.rules.len());

        for spec in &set.rules {
            let regex = Regex::new(&spec.pattern)
                .map_err(|source| Error::InvalidPattern { collection: spec.collection.clone(), source })?;
            let anchored = Regex::new(&format!(r"\A(?:{})\z", spec.pattern))
                .map_err(|source| Error::InvalidPattern { collection: spec.collection.clone(), source })?;
            let available = regex.captures_len();

            if spec.capturing_groups.len() > available {
                return Err(Error::InvalidCapturingGroup {
                    collection: spec.collection.clone(),
                    group: spec.capturing_groups.len() - 1,
                    available,
                });
            }
            if let Some(v) = &spec.verification {
                if v.group >= available {
                    return Err(Error::InvalidCapturingGroup {
                        collection: spec.collection.clone(),
                        group: v.group,
                        available,
                    });
                }
            }

            let groups = spec
                .capturing_groups
                .iter()
                .map(|g| CapturingGroup {
                    extend_selection: g.extend_selection,
                    entity_field_path: g
                        .entity_field_path
                        .as_deref()
                        .map(|path| path.split('.').filter(|s| !s.is_empty()).map(str::to_string).collect()),
                    normalization: g.normalization.clone(),
                })
                .collect();

            rules.push(CompiledRule {
                collection: spec.collection.clone(),
                regex,
                anchored,
                phases: spec.phases(),
                target_score: spec.target_score,
                priority_score: spec.priority_score.unwrap_or(spec.target_score),
                verification: spec.verification.map(|v| Verification { kind: v.kind, group: v.group }),
                groups,
                locales: spec.locales.clone(),
                buckets: spec.buckets.iter().fold(BucketMask::empty(), |acc, &b| acc | BucketMask::from(b)),
            });
        }

        let mut index = RuleIndex::default();
        for (id, rule) in rules.iter().enumerate() {
            for phase in Phase::ALL {
                if rule.phases.has(phase) {
                    index.by_phase[phase.index()].push(id);
                }
            }
        }

        tracing::debug!(
            rules = rules.len(),
            selection = index.by_phase[0].len(),
            classification = index.by_phase[1].len(),
            annotation = index.by_phase[2].len(),
            "compiled rule set"
        );

        Ok(CompiledRules { rules, index, revision: set.revision.clone() })
    }

    /// The bundled rule set, compiled at most once per process.
    pub fn bundled() -> Result<Arc<CompiledRules>> {
        BUNDLED.get_or_try_init(|| RuleSet::bundled().and_then(|set| Self::compile(&set)).map(Arc::new)).cloned()
    }

    /// Union of the phases any rule participates in.
    pub fn phases(&self) -> PhaseSet {
        self.rules.iter().fold(PhaseSet::empty(), |acc, r| acc | r.phases)
    }

    pub fn for_phase(&self, phase: Phase) -> impl Iterator<Item = &CompiledRule> {
        self.index.by_phase[phase.index()].iter().map(|&id| &self.rules[id])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
