//! Deduplication keys for candidate aggregation.
//!
//! Several sources (or one source reporting the same match twice) can propose
//! an identical candidate. A duplicate adds no information, and under the raw
//! usecase two identical knowledge spans would both survive resolution, so
//! the aggregator drops duplicates on the way in.
//!
//! ## What counts as "the same candidate"
//!
//! - Span (`begin`, `end`)
//! - Producing [`Source`]
//! - Top collection
//! - Bit pattern of the top score and priority score
//!
//! The first occurrence wins, which keeps source declaration order intact.

use crate::{AnnotatedSpan, Source};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CandidateKey {
    pub(crate) begin: i32,
    pub(crate) end: i32,
    pub(crate) source: Source,
    pub(crate) collection: String,
    pub(crate) score_bits: u32,
    pub(crate) priority_bits: u32,
}

impl CandidateKey {
    pub(crate) fn from_candidate(candidate: &AnnotatedSpan) -> Self {
        let (score_bits, priority_bits) =
            candidate.top().map(|r| (r.score.to_bits(), r.priority_score.to_bits())).unwrap_or((0, 0));
        CandidateKey {
            begin: candidate.span.begin,
            end: candidate.span.end,
            source: candidate.source,
            collection: candidate.top_collection().to_string(),
            score_bits,
            priority_bits,
        }
    }
}
