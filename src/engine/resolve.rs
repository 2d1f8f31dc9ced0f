//! Conflict resolution.
//!
//! Candidates from every source arrive as one flat list. Resolution picks a
//! consistent subset: no two kept spans may overlap, except that under
//! [`Usecase::Raw`] a span may overlap a knowledge-sourced span.
//!
//! ## Algorithm
//!
//! ```text
//! candidates ──▶ sort by (begin, end) ──▶ sweep into overlap groups
//!                                           │
//!                                           ▼ per group
//!                      rank: real before "other", weight ↓, begin ↑, length ↑, index ↑
//!                      keep each candidate that conflicts with nothing kept so far
//!                                           │
//!                                           ▼
//!                          kept indices, sorted by (begin, end)
//! ```
//!
//! Walking a group in rank order and keeping whatever does not conflict with
//! an already-kept span is the same as repeatedly taking the best remaining
//! candidate and discarding everything it overlaps. It is greedy, not
//! sum-maximizing: `[0,3) w=0.5`, `[1,5) w=1.0`, `[3,7) w=0.6` keeps only
//! `[1,5)`.
//!
//! A candidate whose top collection is `"other"` (or that has no
//! classification at all) weighs nothing and is ranked after every real
//! candidate of its group, so it can never block one.

use crate::{AnnotatedSpan, Source, Usecase};
use std::cmp::Ordering;

/// Indices of the candidates that survive, in `(begin, end)` order.
///
/// Empty or reversed spans are never kept.
pub fn resolve(candidates: &[AnnotatedSpan], usecase: Usecase) -> Vec<usize> {
    let mut order: Vec<usize> =
        (0..candidates.len()).filter(|&i| !candidates[i].span.is_empty() && candidates[i].span.begin >= 0).collect();
    order.sort_by_key(|&i| (candidates[i].span.begin, candidates[i].span.end, i));

    let mut kept = Vec::with_capacity(order.len());
    let mut group_start = 0;
    let mut reach = i32::MIN;

    for (pos, &i) in order.iter().enumerate() {
        let span = candidates[i].span;
        if pos > group_start && span.begin >= reach {
            kept.extend(resolve_group(candidates, &order[group_start..pos], usecase));
            group_start = pos;
            reach = span.end;
        } else {
            reach = reach.max(span.end);
        }
    }
    if group_start < order.len() {
        kept.extend(resolve_group(candidates, &order[group_start..], usecase));
    }

    kept.sort_by_key(|&i| (candidates[i].span.begin, candidates[i].span.end, i));
    tracing::trace!(candidates = candidates.len(), kept = kept.len(), ?usecase, "resolved conflicts");
    kept
}

/// Whether two candidates may not both be kept.
pub(crate) fn conflicts(a: &AnnotatedSpan, b: &AnnotatedSpan, usecase: Usecase) -> bool {
    if !a.span.overlaps(&b.span) {
        return false;
    }
    let knowledge_involved = a.source == Source::Knowledge || b.source == Source::Knowledge;
    !(usecase == Usecase::Raw && knowledge_involved)
}

fn resolve_group(candidates: &[AnnotatedSpan], members: &[usize], usecase: Usecase) -> Vec<usize> {
    if let [only] = members {
        return vec![*only];
    }

    let mut ranked = members.to_vec();
    ranked.sort_by(|&a, &b| rank(candidates, a, b));

    let mut selected: Vec<usize> = Vec::new();
    for i in ranked {
        match selected.iter().find(|&&j| conflicts(&candidates[i], &candidates[j], usecase)) {
            Some(&winner) => tracing::trace!(
                dropped = %candidates[i].span,
                by = %candidates[winner].span,
                collection = candidates[i].top_collection(),
                "candidate eliminated"
            ),
            None => selected.push(i),
        }
    }
    selected
}

/// Best candidate first.
fn rank(candidates: &[AnnotatedSpan], a: usize, b: usize) -> Ordering {
    let (ca, cb) = (&candidates[a], &candidates[b]);
    ca.is_other()
        .cmp(&cb.is_other())
        .then_with(|| cb.weight().total_cmp(&ca.weight()))
        .then_with(|| ca.span.begin.cmp(&cb.span.begin))
        .then_with(|| ca.span.len().cmp(&cb.span.len()))
        .then_with(|| a.cmp(&b))
}
