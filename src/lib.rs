#[macro_use]
mod macros;
mod api;
mod config;
mod datetime;
mod engine;
mod error;
mod rules;
mod text;

pub use api::{AnnotateDetails, AnnotateResult, Options, Pipeline, PipelineBuilder};
pub use config::PipelineConfig;
pub use datetime::{DatetimeParser, DatetimeReference, KnowledgeSource, NumericDateParser, SpanScorer};
pub use engine::{
    BucketMask, CandidateSource, CompiledRules, Gathered, PatternMatcher, RunMetrics, SourceMetrics, Suppression,
    VerificationKind, filter, gather, gather_whole, refine, resolve, snap_whitespace, strip_unpaired_brackets,
    token_span, verify,
};
pub use error::{Error, Result};
pub use rules::{Bucket, GroupSpec, Normalization, RULE_SET_VERSION, RuleSet, RuleSpec, VerificationSpec};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Collection name reserved for "no recognized type".
pub const OTHER_COLLECTION: &str = "other";

// --- Spans ------------------------------------------------------------------

/// Half-open `[begin, end)` interval measured in Unicode codepoints.
///
/// Bounds are signed: callers may hand in arbitrary cursor positions
/// (negative, reversed, past the end) and those are passed back untouched
/// instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodepointSpan {
    pub begin: i32,
    pub end: i32,
}

impl CodepointSpan {
    pub const fn new(begin: i32, end: i32) -> Self {
        Self { begin, end }
    }

    /// Number of codepoints covered (zero for empty or reversed spans).
    pub fn len(&self) -> usize {
        if self.end > self.begin { (self.end as i64 - self.begin as i64) as usize } else { 0 }
    }

    /// `begin >= end`: empty or reversed. Never a valid final result.
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// True when the span is non-empty and lies within a text of `len` codepoints.
    pub fn is_valid_in(&self, len: usize) -> bool {
        self.begin >= 0 && self.begin < self.end && (self.end as usize) <= len
    }

    pub fn overlaps(&self, other: &CodepointSpan) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    pub fn contains(&self, other: &CodepointSpan) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// Shift both bounds by `delta` codepoints.
    pub fn offset(self, delta: i32) -> Self {
        Self { begin: self.begin + delta, end: self.end + delta }
    }

    /// Smallest span covering both.
    pub fn union(self, other: CodepointSpan) -> Self {
        Self { begin: self.begin.min(other.begin), end: self.end.max(other.end) }
    }

    /// Index range; only meaningful for spans that passed [`is_valid_in`](Self::is_valid_in).
    pub(crate) fn range(&self) -> std::ops::Range<usize> {
        self.begin.max(0) as usize..self.end.max(0) as usize
    }
}

impl From<(i32, i32)> for CodepointSpan {
    fn from((begin, end): (i32, i32)) -> Self {
        Self { begin, end }
    }
}

impl fmt::Display for CodepointSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

// --- Classification ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

/// Parsed datetime attached to a classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatetimeInfo {
    pub utc_millis: i64,
    pub granularity: Granularity,
}

/// Structured payload extracted from capturing groups, keyed by field path.
pub type EntityData = serde_json::Map<String, serde_json::Value>;

/// One interpretation of a span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub collection: String,
    pub score: f32,
    pub priority_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime_info: Option<DatetimeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_data: Option<EntityData>,
}

impl ClassificationResult {
    /// Result whose priority falls back to its score.
    pub fn new(collection: impl Into<String>, score: f32) -> Self {
        Self { collection: collection.into(), score, priority_score: score, datetime_info: None, entity_data: None }
    }

    /// The `"other"` sentinel at full confidence.
    pub fn other() -> Self {
        Self::new(OTHER_COLLECTION, 1.0)
    }

    pub fn with_priority(mut self, priority_score: f32) -> Self {
        self.priority_score = priority_score;
        self
    }

    pub fn with_datetime(mut self, info: DatetimeInfo) -> Self {
        self.datetime_info = Some(info);
        self
    }

    pub fn with_entity_data(mut self, data: EntityData) -> Self {
        self.entity_data = Some(data);
        self
    }

    pub fn is_other(&self) -> bool {
        self.collection == OTHER_COLLECTION
    }
}

/// Which subsystem produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Default,
    Knowledge,
    Other,
}

/// A candidate (or final) span with its ordered interpretations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedSpan {
    pub span: CodepointSpan,
    /// Highest-scoring first.
    pub classification: Vec<ClassificationResult>,
    pub source: Source,
}

impl AnnotatedSpan {
    pub fn new(span: CodepointSpan, classification: Vec<ClassificationResult>) -> Self {
        Self { span, classification, source: Source::Default }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn top(&self) -> Option<&ClassificationResult> {
        self.classification.first()
    }

    /// Top collection; a span without classifications reads as `"other"`.
    pub fn top_collection(&self) -> &str {
        self.top().map(|r| r.collection.as_str()).unwrap_or(OTHER_COLLECTION)
    }

    pub fn top_score(&self) -> f32 {
        self.top().map(|r| r.score).unwrap_or(0.0)
    }

    /// True when the span carries no recognized type.
    pub fn is_other(&self) -> bool {
        self.top().is_none_or(ClassificationResult::is_other)
    }

    /// Weight used by conflict resolution: the top priority score, zero for `"other"`.
    pub fn weight(&self) -> f32 {
        match self.top() {
            Some(top) if !top.is_other() => top.priority_score,
            _ => 0.0,
        }
    }
}

// --- Phases and usecases ----------------------------------------------------

/// Which caller operation is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Selection,
    Classification,
    Annotation,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Selection, Phase::Classification, Phase::Annotation];

    pub fn as_set(self) -> PhaseSet {
        match self {
            Phase::Selection => PhaseSet::SELECTION,
            Phase::Classification => PhaseSet::CLASSIFICATION,
            Phase::Annotation => PhaseSet::ANNOTATION,
        }
    }

    /// Fixed slot used by per-phase indexes.
    pub(crate) fn index(self) -> usize {
        match self {
            Phase::Selection => 0,
            Phase::Classification => 1,
            Phase::Annotation => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Selection => "selection",
            Phase::Classification => "classification",
            Phase::Annotation => "annotation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// Set of phases a rule or source participates in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PhaseSet: u8 {
        const SELECTION      = 1 << 0;
        const CLASSIFICATION = 1 << 1;
        const ANNOTATION     = 1 << 2;
    }
}

impl PhaseSet {
    pub fn has(self, phase: Phase) -> bool {
        self.contains(phase.as_set())
    }
}

impl FromIterator<Phase> for PhaseSet {
    fn from_iter<I: IntoIterator<Item = Phase>>(iter: I) -> Self {
        iter.into_iter().fold(PhaseSet::empty(), |acc, p| acc | p.as_set())
    }
}

/// Overlap policy for conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Usecase {
    /// Overlapping spans are always mutually exclusive.
    #[default]
    Smart,
    /// Spans may overlap a knowledge-sourced span.
    Raw,
}
