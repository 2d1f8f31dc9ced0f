//! Pattern rule matching.
//!
//! Runs the compiled rules of one phase against a context string and turns
//! each accepted match into an [`AnnotatedSpan`].
//!
//! ## Per-match steps
//!
//! ```text
//! captures ──▶ verification ──▶ result span ──▶ entity payload ──▶ candidate
//!              (veto on fail)   (extend groups   (bound groups,
//!                                or whole match)  normalized)
//! ```
//!
//! - Rules run in declaration order and matches are reported in the order
//!   `captures_iter` yields them (leftmost-first, non-overlapping), so the
//!   output is reproducible for identical rules and input.
//! - A rule whose extend-selection groups all failed to participate, or whose
//!   result span is empty, produces no candidate.
//! - Spans are converted from byte offsets to codepoints before they leave
//!   this module.
//! - [`PatternMatcher::find_whole`] runs the anchored patterns instead and
//!   only reports rules that match the entire text. Verification and payloads
//!   work the same way; the span is always the whole text.

use super::compiled_rules::{CompiledRule, CompiledRules};
use super::trigger::TriggerInfo;
use super::verify::verify;
use crate::rules::Normalization;
use crate::text::CodepointIndex;
use crate::{AnnotatedSpan, ClassificationResult, CodepointSpan, EntityData, Phase, Source};
use regex::Captures;
use serde_json::Value;

/// Applies a compiled rule set to context strings.
#[derive(Debug, Clone, Copy)]
pub struct PatternMatcher<'r> {
    rules: &'r CompiledRules,
}

impl<'r> PatternMatcher<'r> {
    pub fn new(rules: &'r CompiledRules) -> Self {
        Self { rules }
    }

    /// All candidates the rules enabled for `phase` produce on `context`.
    pub fn find(&self, context: &str, phase: Phase, locales: &[String]) -> Vec<AnnotatedSpan> {
        let index = CodepointIndex::new(context);
        let mut out = Vec::new();

        for rule in self.active(context, phase, locales) {
            let before = out.len();
            for caps in rule.regex.captures_iter(context) {
                let Some(result) = classification(rule, &caps) else {
                    continue;
                };
                if let Some(span) = result_span(rule, &caps, &index) {
                    out.push(AnnotatedSpan::new(span, vec![result]).with_source(Source::Default));
                }
            }
            if out.len() > before {
                tracing::trace!(collection = %rule.collection, %phase, matches = out.len() - before, "rule matched");
            }
        }

        out
    }

    /// Candidates from the rules enabled for `phase` whose pattern matches all
    /// of `text`. Every candidate spans the whole of `text`, whatever its
    /// extend-selection groups say.
    pub fn find_whole(&self, text: &str, phase: Phase, locales: &[String]) -> Vec<AnnotatedSpan> {
        let span = CodepointSpan::new(0, text.chars().count() as i32);
        if span.is_empty() {
            return Vec::new();
        }

        self.active(text, phase, locales)
            .filter_map(|rule| {
                let caps = rule.anchored.captures(text)?;
                let result = classification(rule, &caps)?;
                tracing::trace!(collection = %rule.collection, %phase, "rule matched whole text");
                Some(AnnotatedSpan::new(span, vec![result]).with_source(Source::Default))
            })
            .collect()
    }

    /// Rules of `phase` not ruled out by trigger buckets or locale.
    fn active(&self, context: &str, phase: Phase, locales: &[String]) -> impl Iterator<Item = &'r CompiledRule> {
        let trigger = TriggerInfo::scan(context);
        self.rules.for_phase(phase).filter(move |rule| {
            if !trigger.allows(rule.buckets) {
                tracing::trace!(collection = %rule.collection, "rule skipped by trigger buckets");
                return false;
            }
            if !locale_matches(&rule.locales, locales) {
                tracing::trace!(collection = %rule.collection, "rule skipped by locale");
                return false;
            }
            true
        })
    }
}

/// The rule's result for one match, or `None` when verification vetoes it.
fn classification(rule: &CompiledRule, caps: &Captures<'_>) -> Option<ClassificationResult> {
    if let Some(v) = &rule.verification {
        let text = caps.get(v.group).map(|m| m.as_str())?;
        if !verify(v.kind, text) {
            tracing::debug!(collection = %rule.collection, kind = ?v.kind, "match rejected by verification");
            return None;
        }
    }

    let mut result =
        ClassificationResult::new(rule.collection.clone(), rule.target_score).with_priority(rule.priority_score);
    if let Some(data) = entity_data(rule, caps) {
        result = result.with_entity_data(data);
    }
    Some(result)
}

/// Whole match, or the union of the participating extend-selection groups.
fn result_span(rule: &CompiledRule, caps: &Captures<'_>, index: &CodepointIndex) -> Option<CodepointSpan> {
    let (start, end) = if rule.extends_selection() {
        rule.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.extend_selection)
            .filter_map(|(i, _)| caps.get(i))
            .map(|m| (m.start(), m.end()))
            .reduce(|(s, e), (s2, e2)| (s.min(s2), e.max(e2)))?
    } else {
        let m = caps.get(0)?;
        (m.start(), m.end())
    };

    let span = index.span_of(start, end);
    (!span.is_empty()).then_some(span)
}

fn entity_data(rule: &CompiledRule, caps: &Captures<'_>) -> Option<EntityData> {
    let mut data = EntityData::new();
    for (i, group) in rule.groups.iter().enumerate() {
        let (Some(path), Some(m)) = (&group.entity_field_path, caps.get(i)) else {
            continue;
        };
        let value = Normalization::apply_all(&group.normalization, m.as_str());
        insert_at_path(&mut data, path, Value::String(value));
    }
    (!data.is_empty()).then_some(data)
}

/// Write `value` at `path`, creating (or replacing non-object) intermediates.
pub(crate) fn insert_at_path(data: &mut EntityData, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = data;
    for key in parents {
        let slot = node.entry(key.clone()).or_insert_with(|| Value::Object(EntityData::new()));
        if !slot.is_object() {
            *slot = Value::Object(EntityData::new());
        }
        node = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
    node.insert(last.clone(), value);
}

/// A rule applies when either side lists no locales, the rule allows `*`, or
/// some pair shares its primary language subtag.
pub(crate) fn locale_matches(rule_locales: &[String], requested: &[String]) -> bool {
    if rule_locales.is_empty() || requested.is_empty() {
        return true;
    }
    rule_locales.iter().any(|rule_tag| {
        rule_tag == "*"
            || requested.iter().any(|tag| primary_subtag(rule_tag).eq_ignore_ascii_case(primary_subtag(tag)))
    })
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;

    fn compile(json: &str) -> CompiledRules {
        CompiledRules::compile(&RuleSet::from_json(json).unwrap()).unwrap()
    }

    fn spans(found: &[AnnotatedSpan]) -> Vec<(i32, i32)> {
        found.iter().map(|a| (a.span.begin, a.span.end)).collect()
    }

    #[test]
    fn whole_match_without_extend_groups() {
        let rules = compile(r#"{"version": 1, "rules": [
            {"collection": "num", "pattern": "\\d+", "enabled_phases": ["annotation"], "target_score": 0.7}
        ]}"#);
        let found = PatternMatcher::new(&rules).find("a 12 b 345", Phase::Annotation, &[]);

        assert_eq!(spans(&found), vec![(2, 4), (7, 10)]);
        let top = found[0].top().unwrap();
        assert_eq!(top.collection, "num");
        assert_eq!(top.score, 0.7);
        assert_eq!(top.priority_score, 0.7);
        assert_eq!(found[0].source, Source::Default);
        assert!(top.entity_data.is_none());
    }

    #[test]
    fn extend_groups_select_their_union() {
        let rules = compile(r#"{"version": 1, "rules": [{
            "collection": "range", "pattern": "from (\\w+) to (\\w+)", "enabled_phases": ["annotation"],
            "target_score": 1.0,
            "capturing_groups": [{}, {"extend_selection": true}, {"extend_selection": true}]
        }]}"#);
        let found = PatternMatcher::new(&rules).find("go from Rome to Oslo", Phase::Annotation, &[]);
        assert_eq!(spans(&found), vec![(8, 20)]);
    }

    #[test]
    fn non_participating_extend_group_is_skipped() {
        let rules = compile(r#"{"version": 1, "rules": [{
            "collection": "x", "pattern": "(a)?(b)", "enabled_phases": ["annotation"], "target_score": 1.0,
            "capturing_groups": [{}, {"extend_selection": true}, {"extend_selection": true}]
        }]}"#);
        let found = PatternMatcher::new(&rules).find("b ab", Phase::Annotation, &[]);
        assert_eq!(spans(&found), vec![(0, 1), (2, 4)]);
    }

    #[test]
    fn only_rules_of_the_phase_run() {
        let rules = compile(r#"{"version": 1, "rules": [
            {"collection": "a", "pattern": "a", "enabled_phases": ["selection"], "target_score": 1.0},
            {"collection": "b", "pattern": "b", "enabled_phases": ["annotation"], "target_score": 1.0}
        ]}"#);
        let found = PatternMatcher::new(&rules).find("ab", Phase::Annotation, &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].top_collection(), "b");
    }

    #[test]
    fn luhn_verification_vetoes_matches() {
        let rules = compile(r#"{"version": 1, "rules": [{
            "collection": "payment_card", "pattern": "\\b(?:\\d{4} ?){3}\\d{4}\\b",
            "enabled_phases": ["annotation"], "target_score": 1.0,
            "verification": {"kind": "luhn"}
        }]}"#);
        let matcher = PatternMatcher::new(&rules);

        assert_eq!(spans(&matcher.find("card 4012 8888 8888 1881", Phase::Annotation, &[])), vec![(5, 24)]);
        assert!(matcher.find("card 2221 0067 4735 6282", Phase::Annotation, &[]).is_empty());
    }

    #[test]
    fn bound_groups_fill_entity_payload() {
        let rules = compile(r#"{"version": 1, "rules": [{
            "collection": "flight", "pattern": "\\b([a-z]{2}) ?(\\d{1,4})(?: on (\\w+))?",
            "enabled_phases": ["annotation"], "target_score": 1.0,
            "capturing_groups": [
                {},
                {"entity_field_path": "flight.airline", "normalization": ["uppercase"]},
                {"entity_field_path": "flight.number"},
                {"entity_field_path": "flight.day"}
            ]
        }]}"#);
        let found = PatternMatcher::new(&rules).find("lx 38", Phase::Annotation, &[]);
        let data = found[0].top().unwrap().entity_data.clone().unwrap();

        assert_eq!(serde_json::Value::Object(data), serde_json::json!({"flight": {"airline": "LX", "number": "38"}}));
    }

    #[test]
    fn offsets_are_codepoints() {
        let rules = compile(r#"{"version": 1, "rules": [
            {"collection": "num", "pattern": "\\d+", "enabled_phases": ["annotation"], "target_score": 1.0}
        ]}"#);
        let found = PatternMatcher::new(&rules).find("€€ 42", Phase::Annotation, &[]);
        assert_eq!(spans(&found), vec![(3, 5)]);
    }

    #[test]
    fn locale_filtering() {
        assert!(locale_matches(&[], &["fr".into()]));
        assert!(locale_matches(&["en".into()], &[]));
        assert!(locale_matches(&["en".into()], &["en-US".into()]));
        assert!(locale_matches(&["*".into()], &["ja".into()]));
        assert!(!locale_matches(&["en".into()], &["de-CH".into(), "fr".into()]));

        let rules = compile(r#"{"version": 1, "rules": [{
            "collection": "num", "pattern": "\\d+", "enabled_phases": ["annotation"], "target_score": 1.0,
            "locales": ["de"]
        }]}"#);
        let matcher = PatternMatcher::new(&rules);
        assert!(matcher.find("42", Phase::Annotation, &["en".into()]).is_empty());
        assert_eq!(matcher.find("42", Phase::Annotation, &["de-AT".into()]).len(), 1);
    }

    #[test]
    fn whole_text_matching_ignores_extend_groups() {
        let rules = compile(r#"{"version": 1, "rules": [{
            "collection": "phone", "pattern": "\\(?(\\d{3})\\)? (\\d{4})", "enabled_phases": ["classification"],
            "target_score": 0.9,
            "capturing_groups": [
                {},
                {"extend_selection": true, "entity_field_path": "phone.area"},
                {"extend_selection": true}
            ]
        }]}"#);
        let matcher = PatternMatcher::new(&rules);

        assert_eq!(spans(&matcher.find("(857) 3556", Phase::Classification, &[])), vec![(1, 10)]);

        let whole = matcher.find_whole("(857) 3556", Phase::Classification, &[]);
        assert_eq!(spans(&whole), vec![(0, 10)]);
        let data = whole[0].top().unwrap().entity_data.clone().unwrap();
        assert_eq!(serde_json::Value::Object(data), serde_json::json!({"phone": {"area": "857"}}));

        assert!(matcher.find_whole("x (857) 3556", Phase::Classification, &[]).is_empty());
        assert!(matcher.find_whole("(857) 3556 x", Phase::Classification, &[]).is_empty());
        assert!(matcher.find_whole("", Phase::Classification, &[]).is_empty());
    }

    #[test]
    fn whole_text_matching_still_verifies() {
        let rules = compile(r#"{"version": 1, "rules": [{
            "collection": "payment_card", "pattern": "(?:\\d{4} ?){3}\\d{4}",
            "enabled_phases": ["classification"], "target_score": 1.0,
            "verification": {"kind": "luhn"}
        }]}"#);
        let matcher = PatternMatcher::new(&rules);

        assert_eq!(matcher.find_whole("4012 8888 8888 1881", Phase::Classification, &[]).len(), 1);
        assert!(matcher.find_whole("2221 0067 4735 6282", Phase::Classification, &[]).is_empty());
    }

    #[test]
    fn insert_at_path_replaces_scalars() {
        let mut data = EntityData::new();
        insert_at_path(&mut data, &["a".into()], Value::from("x"));
        insert_at_path(&mut data, &["a".into(), "b".into()], Value::from("y"));
        assert_eq!(Value::Object(data), serde_json::json!({"a": {"b": "y"}}));
    }
}
