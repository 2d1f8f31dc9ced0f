//! Run metrics.
//!
//! Timing and counting data for one annotation run, collected only on the
//! verbose path (`Pipeline::annotate_verbose`) and printed by the CLI.
//!
//! - `SourceMetrics` is per candidate source, accumulated over all lines.
//! - `candidates` counts what reached resolution (after thresholding and
//!   dedup); `kept` counts what survived resolution, before output filtering.

use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    /// Total elapsed time for the run.
    pub total: Duration,
    /// Per-source gather timings, in source declaration order.
    pub sources: Vec<SourceMetrics>,
    /// Time spent in conflict resolution.
    pub resolve: Duration,
    /// Candidates handed to the resolver.
    pub candidates: usize,
    /// Candidates the resolver kept.
    pub kept: usize,
    /// Lines processed.
    pub lines: usize,
}

/// Timing and yield of one candidate source.
#[derive(Debug, Default, Clone)]
pub struct SourceMetrics {
    pub source: &'static str,
    pub duration: Duration,
    /// Candidates accepted from this source.
    pub produced: usize,
}

impl RunMetrics {
    /// Fold one gather pass into the per-source totals.
    pub fn record_sources(&mut self, pass: &[SourceMetrics]) {
        for m in pass {
            match self.sources.iter_mut().find(|s| s.source == m.source) {
                Some(total) => {
                    total.duration += m.duration;
                    total.produced += m.produced;
                }
                None => self.sources.push(m.clone()),
            }
        }
    }
}
