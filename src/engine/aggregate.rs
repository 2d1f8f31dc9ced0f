//! Candidate aggregation.
//!
//! Every producer of candidates is one variant of [`CandidateSource`]. For a
//! given context and phase the aggregator asks each source that serves the
//! phase, in declaration order, and concatenates what they return.
//!
//! On the way in each candidate is:
//!
//! - stamped with its [`Source`] (knowledge output is [`Source::Knowledge`],
//!   everything else [`Source::Default`]),
//! - dropped if its span is empty or does not fit in the context,
//! - dropped if its top score is below `Options::min_confidence`,
//! - dropped if an identical candidate was already accepted (see `dedup.rs`).
//!
//! [`gather_whole`] serves classification of a caller-chosen span: only
//! pattern sources take part, and only rules matching the entire span count.

use super::compiled_rules::CompiledRules;
use super::dedup::CandidateKey;
use super::matcher::PatternMatcher;
use super::metrics::SourceMetrics;
use crate::api::Options;
use crate::datetime::{DatetimeParser, KnowledgeSource, SpanScorer};
use crate::{AnnotatedSpan, Phase, PhaseSet, Source};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// A producer of candidate spans.
#[derive(Clone)]
pub enum CandidateSource {
    Patterns(Arc<CompiledRules>),
    Model(Arc<dyn SpanScorer>),
    Datetime(Arc<dyn DatetimeParser>),
    Knowledge(Arc<dyn KnowledgeSource>),
}

impl fmt::Debug for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateSource::Patterns(rules) => f.debug_tuple("Patterns").field(&rules.len()).finish(),
            other => f.write_str(other.label()),
        }
    }
}

impl CandidateSource {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateSource::Patterns(_) => "patterns",
            CandidateSource::Model(_) => "model",
            CandidateSource::Datetime(_) => "datetime",
            CandidateSource::Knowledge(_) => "knowledge",
        }
    }

    /// Phases this source can produce candidates for.
    pub fn phases(&self) -> PhaseSet {
        match self {
            CandidateSource::Patterns(rules) => rules.phases(),
            CandidateSource::Model(m) => m.phases(),
            CandidateSource::Datetime(d) => d.phases(),
            CandidateSource::Knowledge(k) => k.phases(),
        }
    }

    fn source(&self) -> Source {
        match self {
            CandidateSource::Knowledge(_) => Source::Knowledge,
            _ => Source::Default,
        }
    }

    /// Raw output of this source for `context`.
    pub fn collect(&self, context: &str, phase: Phase, options: &Options) -> Vec<AnnotatedSpan> {
        match self {
            CandidateSource::Patterns(rules) => PatternMatcher::new(rules).find(context, phase, &options.locales),
            CandidateSource::Model(m) => m.score(context, phase, options),
            CandidateSource::Datetime(d) => d.parse(context, &options.reference(), &options.locales),
            CandidateSource::Knowledge(k) => k.lookup(context, phase),
        }
    }
}

/// Result of one aggregation pass.
#[derive(Debug, Default)]
pub struct Gathered {
    pub candidates: Vec<AnnotatedSpan>,
    pub sources: Vec<SourceMetrics>,
}

/// Union of every source's candidates for `context`, in declaration order.
pub fn gather(sources: &[CandidateSource], context: &str, phase: Phase, options: &Options) -> Gathered {
    let context_len = context.chars().count();
    let mut seen: HashSet<CandidateKey> = HashSet::new();
    let mut out = Gathered::default();

    for source in sources.iter().filter(|s| s.phases().has(phase)) {
        let start = Instant::now();
        let stamp = source.source();
        let mut produced = 0;

        for candidate in source.collect(context, phase, options) {
            let candidate = candidate.with_source(stamp);
            if candidate.span.is_empty() || !candidate.span.is_valid_in(context_len) {
                tracing::debug!(source = source.label(), span = %candidate.span, "candidate outside context dropped");
                continue;
            }
            if candidate.top_score() < options.min_confidence {
                continue;
            }
            if !seen.insert(CandidateKey::from_candidate(&candidate)) {
                continue;
            }
            produced += 1;
            out.candidates.push(candidate);
        }

        tracing::trace!(source = source.label(), %phase, produced, "source gathered");
        out.sources.push(SourceMetrics { source: source.label(), duration: start.elapsed(), produced });
    }

    out
}

/// Pattern candidates covering all of `text`, for every pattern source that
/// serves `phase`. Spans are in `text` coordinates.
pub fn gather_whole(sources: &[CandidateSource], text: &str, phase: Phase, options: &Options) -> Vec<AnnotatedSpan> {
    sources
        .iter()
        .filter(|s| s.phases().has(phase))
        .filter_map(|s| match s {
            CandidateSource::Patterns(rules) => {
                Some(PatternMatcher::new(rules).find_whole(text, phase, &options.locales))
            }
            _ => None,
        })
        .flatten()
        .filter(|c| c.top_score() >= options.min_confidence)
        .collect()
}
