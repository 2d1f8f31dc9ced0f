//! Candidate collaborators.
//!
//! The engine consumes three kinds of external recognizers, each behind a
//! small trait so that callers can plug in their own:
//!
//! - [`SpanScorer`]: a statistical model proposing scored spans.
//! - [`DatetimeParser`]: a date/time grammar proposing spans with parsed
//!   [`DatetimeInfo`]; ambiguous readings are several results on one span.
//! - [`KnowledgeSource`]: an entity lookup; its spans are tagged
//!   [`Source::Knowledge`](crate::Source::Knowledge) by the aggregator.
//!
//! Implementations must be `Send + Sync`: a pipeline is shared across
//! threads and calls them concurrently without locking.
//!
//! [`NumericDateParser`] is the date parser bundled with the crate. It only
//! understands all-numeric calendar dates (`2026-10-17`, `2026/10/17 14:30`)
//! and the relative words `today`, `tomorrow` and `yesterday`, resolved
//! against the reference time in UTC.

use crate::api::Options;
use crate::text::CodepointIndex;
use crate::{AnnotatedSpan, ClassificationResult, DatetimeInfo, Granularity, Phase, PhaseSet};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

/// Statistical span model.
pub trait SpanScorer: Send + Sync {
    /// Scored candidate spans for `context`, in context coordinates.
    fn score(&self, context: &str, phase: Phase, options: &Options) -> Vec<AnnotatedSpan>;

    /// Phases the model can serve.
    fn phases(&self) -> PhaseSet {
        PhaseSet::all()
    }
}

/// Reference point for relative datetime expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatetimeReference {
    pub time: DateTime<Utc>,
    /// Timezone label supplied by the caller, passed through to parsers.
    pub timezone: String,
}

/// Date/time grammar.
pub trait DatetimeParser: Send + Sync {
    fn parse(&self, context: &str, reference: &DatetimeReference, locales: &[String]) -> Vec<AnnotatedSpan>;

    fn phases(&self) -> PhaseSet {
        PhaseSet::all()
    }
}

/// Entity lookup.
pub trait KnowledgeSource: Send + Sync {
    fn lookup(&self, context: &str, phase: Phase) -> Vec<AnnotatedSpan>;

    fn phases(&self) -> PhaseSet {
        PhaseSet::all()
    }
}

/// Bundled date parser for numeric dates and a few relative day words.
#[derive(Debug, Clone)]
pub struct NumericDateParser {
    score: f32,
    priority_score: f32,
}

impl Default for NumericDateParser {
    fn default() -> Self {
        Self { score: 1.0, priority_score: 0.9 }
    }
}

impl NumericDateParser {
    pub fn new(score: f32, priority_score: f32) -> Self {
        Self { score, priority_score }
    }

    fn result(&self, collection: &str, utc_millis: i64, granularity: Granularity) -> ClassificationResult {
        ClassificationResult::new(collection, self.score)
            .with_priority(self.priority_score)
            .with_datetime(DatetimeInfo { utc_millis, granularity })
    }

    fn numeric_dates(&self, context: &str, index: &CodepointIndex, out: &mut Vec<AnnotatedSpan>) {
        let re = regex!(r"\b(\d{4})([-/])(\d{1,2})([-/])(\d{1,2})(?:[ T](\d{1,2}):(\d{2}))?\b");

        for caps in re.captures_iter(context) {
            let (Some(whole), Some(year), Some(month), Some(day)) = (caps.get(0), caps.get(1), caps.get(3), caps.get(5))
            else {
                continue;
            };
            // Mixed separators ("2026-10/17") are not dates.
            if caps.get(2).map(|m| m.as_str()) != caps.get(4).map(|m| m.as_str()) {
                continue;
            }
            let date = match (year.as_str().parse(), month.as_str().parse(), day.as_str().parse()) {
                (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d),
                _ => None,
            };
            let Some(date) = date else {
                continue;
            };

            let time = match (caps.get(6), caps.get(7)) {
                (Some(h), Some(mi)) => match (h.as_str().parse(), mi.as_str().parse()) {
                    (Ok(h), Ok(mi)) => NaiveTime::from_hms_opt(h, mi, 0),
                    _ => None,
                },
                _ => None,
            };

            let (end_byte, result) = match time {
                Some(time) => {
                    let millis = date.and_time(time).and_utc().timestamp_millis();
                    (whole.end(), self.result("datetime", millis, Granularity::Minute))
                }
                None => {
                    let millis = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
                    (day.end(), self.result("date", millis, Granularity::Day))
                }
            };
            out.push(AnnotatedSpan::new(index.span_of(whole.start(), end_byte), vec![result]));
        }
    }

    fn relative_days(
        &self,
        context: &str,
        index: &CodepointIndex,
        reference: &DatetimeReference,
        out: &mut Vec<AnnotatedSpan>,
    ) {
        let re = regex!(r"(?i)\b(today|tomorrow|yesterday)\b");
        let today = reference.time.date_naive();

        for m in re.find_iter(context) {
            let date = match m.as_str().to_ascii_lowercase().as_str() {
                "today" => Some(today),
                "tomorrow" => today.checked_add_days(Days::new(1)),
                "yesterday" => today.checked_sub_days(Days::new(1)),
                _ => None,
            };
            let Some(date) = date else {
                continue;
            };
            let millis = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
            out.push(AnnotatedSpan::new(
                index.span_of(m.start(), m.end()),
                vec![self.result("date", millis, Granularity::Day)],
            ));
        }
    }
}

impl DatetimeParser for NumericDateParser {
    fn parse(&self, context: &str, reference: &DatetimeReference, _locales: &[String]) -> Vec<AnnotatedSpan> {
        let index = CodepointIndex::new(context);
        let mut out = Vec::new();
        self.numeric_dates(context, &index, &mut out);
        self.relative_days(context, &index, reference, &mut out);
        out.sort_by_key(|a| (a.span.begin, a.span.end));
        out
    }
}
