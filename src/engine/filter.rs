//! Output filtering.
//!
//! Removes spans whose top collection is suppressed for the phase being
//! served. Filtering runs strictly after conflict resolution: a suppressed
//! span still takes part in resolution, may eliminate a weaker overlapping
//! span, and is only then dropped. Both spans are gone from the output in
//! that case.

use crate::{AnnotatedSpan, Phase};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Suppressed collection names, one set per phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suppression {
    pub selection: HashSet<String>,
    pub classification: HashSet<String>,
    pub annotation: HashSet<String>,
}

impl Suppression {
    /// Suppress `collections` in every phase.
    pub fn everywhere<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = collections.into_iter().map(Into::into).collect();
        Self { selection: set.clone(), classification: set.clone(), annotation: set }
    }

    pub fn for_phase(&self, phase: Phase) -> &HashSet<String> {
        match phase {
            Phase::Selection => &self.selection,
            Phase::Classification => &self.classification,
            Phase::Annotation => &self.annotation,
        }
    }

    pub fn for_phase_mut(&mut self, phase: Phase) -> &mut HashSet<String> {
        match phase {
            Phase::Selection => &mut self.selection,
            Phase::Classification => &mut self.classification,
            Phase::Annotation => &mut self.annotation,
        }
    }

    pub fn is_suppressed(&self, phase: Phase, collection: &str) -> bool {
        self.for_phase(phase).contains(collection)
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_empty() && self.classification.is_empty() && self.annotation.is_empty()
    }

    /// Union of both suppression lists.
    pub fn merged(&self, other: &Suppression) -> Suppression {
        let mut out = self.clone();
        for phase in Phase::ALL {
            out.for_phase_mut(phase).extend(other.for_phase(phase).iter().cloned());
        }
        out
    }
}

/// Drop every span whose top collection is suppressed for `phase`.
pub fn filter(spans: Vec<AnnotatedSpan>, suppressed: &Suppression, phase: Phase) -> Vec<AnnotatedSpan> {
    if suppressed.for_phase(phase).is_empty() {
        return spans;
    }
    spans
        .into_iter()
        .filter(|span| {
            let keep = !suppressed.is_suppressed(phase, span.top_collection());
            if !keep {
                tracing::debug!(span = %span.span, collection = span.top_collection(), %phase, "suppressed");
            }
            keep
        })
        .collect()
}
