//! Candidate resolution engine.
//!
//! The engine is split into focused submodules under `src/engine/`. The
//! public paths stay flat (`crate::engine::CompiledRules`,
//! `crate::engine::resolve`, ...).
//!
//! ## How the parts work together
//!
//! ```text
//! RuleSet ── CompiledRules::compile ──┐            (compiled_rules.rs)
//!                                     │
//! context ── TriggerInfo::scan ───────┼─ skip rules by buckets/locales
//!            (trigger.rs)             │
//!                                     v
//!                          PatternMatcher::find    (matcher.rs)
//!                            - regex captures
//!                            - verification veto    (verify.rs)
//!                            - extend groups, payload
//!                                     │
//!   model / datetime / knowledge ─────┤
//!                                     v
//!                          gather                  (aggregate.rs)
//!                            - stamp Source, drop invalid spans
//!                            - min_confidence threshold
//!                            - dedup via CandidateKey (dedup.rs)
//!                                     │
//!                                     v
//!                          resolve                 (resolve.rs)
//!                            - overlap groups, greedy by weight
//!                                     │
//!                                     v
//!                          filter                  (filter.rs)
//!                            - per-phase suppression
//!                                     │
//!                     selection only: v
//!                          refine                  (refine.rs)
//! ```
//!
//! All of it is stateless per call. The only shared state is the compiled
//! rule data, which is immutable after construction.
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: compiles a `RuleSet`, validates group references and
//!   indexes rules by phase.
//! - `trigger.rs`: coarse input features (digits, `@`, `:`, `/`) used to skip
//!   rules cheaply.
//! - `verify.rs`: post-match checks (Luhn).
//! - `matcher.rs`: runs one phase's rules and builds candidates.
//! - `aggregate.rs`: unions candidates from every source.
//! - `dedup.rs`: identity of a candidate for duplicate removal.
//! - `resolve.rs`: picks the non-conflicting subset.
//! - `refine.rs`: adjusts a chosen selection's boundaries.
//! - `filter.rs`: drops suppressed collections.
//! - `metrics.rs`: timing/counting data for verbose runs.
//!
//! ## Adding a coarse trigger
//!
//! Add a `BucketMask` bit, a `Bucket` variant in the rule-set schema, and
//! teach `TriggerInfo::scan` to set it.

#[path = "engine/aggregate.rs"]
mod aggregate;
#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/filter.rs"]
mod filter;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/refine.rs"]
mod refine;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/trigger.rs"]
mod trigger;
#[path = "engine/verify.rs"]
mod verify;

pub use aggregate::{CandidateSource, Gathered, gather, gather_whole};
pub use compiled_rules::{BucketMask, CompiledRules};
pub use filter::{Suppression, filter};
pub use matcher::PatternMatcher;
pub use metrics::{RunMetrics, SourceMetrics};
pub use refine::{refine, snap_whitespace, strip_unpaired_brackets, token_span};
pub use resolve::resolve;
pub use verify::{VerificationKind, verify};
