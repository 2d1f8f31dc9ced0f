use crate::config::PipelineConfig;
use crate::datetime::{DatetimeParser, DatetimeReference, KnowledgeSource, NumericDateParser, SpanScorer};
use crate::engine::{self, CandidateSource, CompiledRules, RunMetrics, SourceMetrics, Suppression};
use crate::error::{Error, Result};
use crate::text::{self, DecodedText, Exclusions, Line};
use crate::{AnnotatedSpan, ClassificationResult, CodepointSpan, Phase, Usecase};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-request options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Requested language tags, most preferred first.
    pub locales: Vec<String>,
    pub usecase: Usecase,
    /// Reference datetime used to resolve relative expressions.
    pub reference_time: DateTime<Utc>,
    pub reference_timezone: String,
    /// Caller suppression lists, merged with the pipeline's.
    pub suppressed: Suppression,
    /// Candidates whose top score is below this are dropped before resolution.
    pub min_confidence: f32,
    pub max_selection_codepoints: Option<usize>,
    pub max_classification_codepoints: Option<usize>,
    pub max_classification_tokens: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        let reference_time = if cfg!(test) {
            Utc.with_ymd_and_hms(2013, 2, 12, 4, 30, 0).single().unwrap_or_default()
        } else {
            Utc::now()
        };
        Self {
            locales: vec!["en".to_string()],
            usecase: Usecase::Smart,
            reference_time,
            reference_timezone: "UTC".to_string(),
            suppressed: Suppression::default(),
            min_confidence: 0.0,
            max_selection_codepoints: None,
            max_classification_codepoints: None,
            max_classification_tokens: None,
        }
    }
}

impl Options {
    pub fn reference(&self) -> DatetimeReference {
        DatetimeReference { time: self.reference_time, timezone: self.reference_timezone.clone() }
    }
}

/// Result from [`Pipeline::annotate_verbose`].
#[derive(Debug, Clone)]
pub struct AnnotateResult {
    pub text: String,
    pub spans: Vec<AnnotatedSpan>,
    pub details: AnnotateDetails,
}

/// Intermediate state of a verbose annotation run, in whole-text coordinates.
#[derive(Debug, Clone, Default)]
pub struct AnnotateDetails {
    /// Everything the sources proposed that reached resolution.
    pub candidates: Vec<AnnotatedSpan>,
    /// Resolution survivors, before output filtering.
    pub resolved: Vec<AnnotatedSpan>,
    /// Indices into `candidates` of the resolution survivors, in `resolved` order.
    pub kept: Vec<usize>,
    pub metrics: RunMetrics,
}

impl AnnotateDetails {
    /// Whether `candidates[index]` survived resolution.
    pub fn is_kept(&self, index: usize) -> bool {
        self.kept.contains(&index)
    }
}

/// A configured set of candidate sources plus the settings that drive them.
///
/// Cheap to clone and safe to share between threads: every source is
/// reference-counted and read-only.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    sources: Vec<CandidateSource>,
}

#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    sources: Vec<CandidateSource>,
}

impl PipelineBuilder {
    pub fn with_rules(self, rules: Arc<CompiledRules>) -> Self {
        self.with_source(CandidateSource::Patterns(rules))
    }

    pub fn with_model(self, model: Arc<dyn SpanScorer>) -> Self {
        self.with_source(CandidateSource::Model(model))
    }

    pub fn with_datetime(self, parser: Arc<dyn DatetimeParser>) -> Self {
        self.with_source(CandidateSource::Datetime(parser))
    }

    pub fn with_knowledge(self, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        self.with_source(CandidateSource::Knowledge(knowledge))
    }

    pub fn with_source(mut self, source: CandidateSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Fails if a phase the config enables has no source serving it.
    pub fn build(self) -> Result<Pipeline> {
        for &phase in &self.config.enabled_phases {
            if !self.sources.iter().any(|s| s.phases().has(phase)) {
                return Err(Error::MissingComponent { phase });
            }
        }
        tracing::debug!(
            sources = ?self.sources.iter().map(CandidateSource::label).collect::<Vec<_>>(),
            phases = ?self.config.enabled_phases,
            "pipeline built"
        );
        Ok(Pipeline { config: self.config, sources: self.sources })
    }
}

/// Candidates of one line, resolved but not yet filtered. Spans are in line
/// coordinates.
struct LineRun {
    candidates: Vec<AnnotatedSpan>,
    kept: Vec<usize>,
    sources: Vec<SourceMetrics>,
    resolve: Duration,
}

impl LineRun {
    fn resolved(&self) -> Vec<AnnotatedSpan> {
        self.kept.iter().map(|&i| self.candidates[i].clone()).collect()
    }
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder { config, sources: Vec::new() }
    }

    /// Bundled rules and date parser with the default config.
    pub fn with_defaults() -> Result<Self> {
        Self::from_config(PipelineConfig::default())
    }

    /// Bundled rules (and the date parser if `config.bundled_dates`).
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        Self::from_rules(config, CompiledRules::bundled()?)
    }

    /// `rules` (and the bundled date parser if `config.bundled_dates`).
    pub fn from_rules(config: PipelineConfig, rules: Arc<CompiledRules>) -> Result<Self> {
        let dates = config.bundled_dates;
        let mut builder = Self::builder(config).with_rules(rules);
        if dates {
            builder = builder.with_datetime(Arc::new(NumericDateParser::default()));
        }
        builder.build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sources(&self) -> &[CandidateSource] {
        &self.sources
    }

    fn serves(&self, phase: Phase) -> bool {
        let serves = self.config.phases().has(phase);
        if !serves {
            tracing::debug!(%phase, "phase not enabled for this pipeline");
        }
        serves
    }

    fn suppression(&self, options: &Options) -> Suppression {
        self.config.suppressed.merged(&options.suppressed)
    }

    /// Gather and resolve one line. `extra` candidates join the gathered ones
    /// and `accept` sees each of them (in line coordinates) before resolution.
    fn run_line(
        &self,
        line: &Line<'_>,
        phase: Phase,
        options: &Options,
        exclusions: Exclusions<'_>,
        extra: Vec<AnnotatedSpan>,
        accept: impl Fn(&AnnotatedSpan) -> bool,
    ) -> LineRun {
        let gathered = engine::gather(&self.sources, line.text, phase, options);
        let offset = line.begin as i32;

        let candidates: Vec<AnnotatedSpan> = gathered
            .candidates
            .into_iter()
            .chain(extra)
            .filter(|c| !exclusions.touches(c.span.offset(offset)))
            .filter(|c| accept(c))
            .collect();

        let start = Instant::now();
        let kept = engine::resolve(&candidates, options.usecase);
        LineRun { candidates, kept, sources: gathered.sources, resolve: start.elapsed() }
    }

    /// The span to select when the caller clicked `click`.
    ///
    /// Invalid, over-long or cross-line clicks come back unchanged.
    pub fn suggest_selection(&self, text: &str, click: CodepointSpan, options: &Options) -> CodepointSpan {
        self.suggest_selection_in(text, click, options, Exclusions::none())
    }

    /// [`suggest_selection`](Self::suggest_selection) on raw bytes. Offsets
    /// count each malformed sequence as one codepoint.
    pub fn suggest_selection_bytes(&self, bytes: &[u8], click: CodepointSpan, options: &Options) -> CodepointSpan {
        let decoded = DecodedText::decode(bytes);
        self.suggest_selection_in(&decoded.text, click, options, decoded.exclusions())
    }

    fn suggest_selection_in(
        &self,
        text: &str,
        click: CodepointSpan,
        options: &Options,
        exclusions: Exclusions<'_>,
    ) -> CodepointSpan {
        if !self.serves(Phase::Selection) {
            return click;
        }
        let max_len = options.max_selection_codepoints.unwrap_or(self.config.max_selection_codepoints);
        if click.is_empty() || !click.is_valid_in(text.chars().count()) || click.len() > max_len {
            return click;
        }

        let snapped = engine::snap_whitespace(text, click);
        if exclusions.covers(snapped) {
            return click;
        }
        let Some(line) = text::line_containing(text, snapped) else {
            return click;
        };
        let local = snapped.offset(-(line.begin as i32));

        let run = self.run_line(&line, Phase::Selection, options, exclusions, Vec::new(), |_| true);
        let suppressed = self.suppression(options);
        let winner = engine::filter(run.resolved(), &suppressed, Phase::Selection)
            .into_iter()
            .find(|c| c.span.overlaps(&local))
            .map(|c| c.span);

        let chosen = match winner {
            Some(span) => span,
            None => {
                tracing::trace!(click = %local, "no candidate at click, selecting word tokens");
                engine::token_span(line.text, local)
            }
        };
        engine::refine(line.text, chosen).offset(line.begin as i32)
    }

    /// Classifications for exactly `span`, best first.
    ///
    /// A pattern rule recognizes the span when it matches the span's whole
    /// text, or when its match over the line has exactly that span. Other
    /// sources must propose exactly that span.
    ///
    /// Returns `[other]` for invalid, over-long or cross-line spans and when
    /// nothing recognizes the span.
    pub fn classify(&self, text: &str, span: CodepointSpan, options: &Options) -> Vec<ClassificationResult> {
        self.classify_in(text, span, options, Exclusions::none())
    }

    pub fn classify_bytes(&self, bytes: &[u8], span: CodepointSpan, options: &Options) -> Vec<ClassificationResult> {
        let decoded = DecodedText::decode(bytes);
        self.classify_in(&decoded.text, span, options, decoded.exclusions())
    }

    fn classify_in(
        &self,
        text: &str,
        span: CodepointSpan,
        options: &Options,
        exclusions: Exclusions<'_>,
    ) -> Vec<ClassificationResult> {
        let other = || vec![ClassificationResult::other()];
        if !self.serves(Phase::Classification) {
            return other();
        }

        let max_len = options.max_classification_codepoints.unwrap_or(self.config.max_classification_codepoints);
        if span.is_empty() || !span.is_valid_in(text.chars().count()) || span.len() > max_len {
            return other();
        }
        if exclusions.touches(span) {
            return other();
        }
        let Some(line) = text::line_containing(text, span) else {
            return other();
        };
        let local = span.offset(-(line.begin as i32));

        let max_tokens = options.max_classification_tokens.unwrap_or(self.config.max_classification_tokens);
        let index = text::CodepointIndex::new(line.text);
        let selected = index.slice(line.text, local);
        if text::token_count(selected) > max_tokens {
            tracing::debug!(%span, max_tokens, "span has too many tokens to classify");
            return other();
        }

        let whole: Vec<AnnotatedSpan> = engine::gather_whole(&self.sources, selected, Phase::Classification, options)
            .into_iter()
            .map(|c| AnnotatedSpan { span: local, ..c })
            .collect();
        let run = self.run_line(&line, Phase::Classification, options, exclusions, whole, |c| c.span == local);
        let suppressed = self.suppression(options);
        engine::filter(run.resolved(), &suppressed, Phase::Classification)
            .into_iter()
            .find(|c| !c.classification.is_empty())
            .map(|c| c.classification)
            .unwrap_or_else(other)
    }

    /// Every recognized entity in `text`, sorted by span.
    pub fn annotate(&self, text: &str, options: &Options) -> Vec<AnnotatedSpan> {
        self.annotate_in(text, options, Exclusions::none(), None)
    }

    pub fn annotate_bytes(&self, bytes: &[u8], options: &Options) -> Vec<AnnotatedSpan> {
        let decoded = DecodedText::decode(bytes);
        self.annotate_in(&decoded.text, options, decoded.exclusions(), None)
    }

    /// [`annotate`](Self::annotate) plus the intermediate candidates and timings.
    pub fn annotate_verbose(&self, text: &str, options: &Options) -> AnnotateResult {
        let mut details = AnnotateDetails::default();
        let spans = self.annotate_in(text, options, Exclusions::none(), Some(&mut details));
        AnnotateResult { text: text.to_string(), spans, details }
    }

    fn annotate_in(
        &self,
        text: &str,
        options: &Options,
        exclusions: Exclusions<'_>,
        mut details: Option<&mut AnnotateDetails>,
    ) -> Vec<AnnotatedSpan> {
        let start = Instant::now();
        if !self.serves(Phase::Annotation) {
            return Vec::new();
        }
        let suppressed = self.suppression(options);
        let mut out = Vec::new();
        let mut lines = 0;

        for line in text::lines(text) {
            if line.len == 0 {
                continue;
            }
            lines += 1;
            let offset = line.begin as i32;
            let run = self.run_line(&line, Phase::Annotation, options, exclusions, Vec::new(), |_| true);
            let resolved = run.resolved();

            if let Some(d) = details.as_deref_mut() {
                let shift = |c: &AnnotatedSpan| AnnotatedSpan { span: c.span.offset(offset), ..c.clone() };
                let base = d.candidates.len();
                d.kept.extend(run.kept.iter().map(|&i| base + i));
                d.candidates.extend(run.candidates.iter().map(shift));
                d.resolved.extend(resolved.iter().map(shift));
                d.metrics.record_sources(&run.sources);
                d.metrics.resolve += run.resolve;
                d.metrics.candidates += run.candidates.len();
                d.metrics.kept += run.kept.len();
            }

            out.extend(engine::filter(resolved, &suppressed, Phase::Annotation).into_iter().map(|mut c| {
                c.span = c.span.offset(offset);
                c
            }));
        }

        if let Some(d) = details {
            d.metrics.lines = lines;
            d.metrics.total = start.elapsed();
        }
        tracing::debug!(spans = out.len(), lines, "annotated text");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PhaseSet, Source};

    fn pipeline() -> Pipeline {
        Pipeline::with_defaults().unwrap()
    }

    fn sp(begin: i32, end: i32) -> CodepointSpan {
        CodepointSpan::new(begin, end)
    }

    struct FixedKnowledge(Vec<AnnotatedSpan>);

    impl KnowledgeSource for FixedKnowledge {
        fn lookup(&self, _context: &str, _phase: Phase) -> Vec<AnnotatedSpan> {
            self.0.clone()
        }
    }

    struct FixedModel(Vec<AnnotatedSpan>);

    impl SpanScorer for FixedModel {
        fn score(&self, _context: &str, _phase: Phase, _options: &Options) -> Vec<AnnotatedSpan> {
            self.0.clone()
        }
    }

    fn cand(begin: i32, end: i32, collection: &str, score: f32) -> AnnotatedSpan {
        AnnotatedSpan::new(sp(begin, end), vec![ClassificationResult::new(collection, score)])
    }

    #[test]
    fn phone_click_selects_the_number_without_the_stray_bracket() {
        //          0         1         2         3
        //          0123456789012345678901234567890
        let text = "call me at (857) 225 3556 today";
        assert_eq!(pipeline().suggest_selection(text, sp(12, 15), &Options::default()), sp(12, 25));
    }

    #[test]
    fn selection_does_not_depend_on_the_clicked_codepoint() {
        let text = "call me at (857) 225 3556 today";
        let p = pipeline();
        let options = Options::default();

        for begin in 12..25 {
            assert_eq!(p.suggest_selection(text, sp(begin, begin + 1), &options), sp(12, 25), "click at {begin}");
        }
        for begin in 0..4 {
            assert_eq!(p.suggest_selection(text, sp(begin, begin + 1), &options), sp(0, 4), "click at {begin}");
        }
        for begin in 26..31 {
            assert_eq!(p.suggest_selection(text, sp(begin, begin + 1), &options), sp(26, 31), "click at {begin}");
        }
    }

    #[test]
    fn invalid_clicks_are_returned_unchanged() {
        let p = pipeline();
        let options = Options::default();
        for click in [sp(-4, 2), sp(3, 1), sp(0, 200), sp(5, 5)] {
            assert_eq!(p.suggest_selection("hello world", click, &options), click);
        }

        let tight = Options { max_selection_codepoints: Some(3), ..Options::default() };
        assert_eq!(p.suggest_selection("hello world", sp(0, 5), &tight), sp(0, 5));
        assert_eq!(p.suggest_selection("ab\ncd", sp(1, 4), &options), sp(1, 4));
    }

    #[test]
    fn suppressed_selection_falls_back_to_tokens() {
        let text = "mail a@b.com now";
        let options = Options { suppressed: Suppression::everywhere(["email"]), ..Options::default() };
        let p = pipeline();

        assert_eq!(p.suggest_selection(text, sp(5, 6), &Options::default()), sp(5, 12));
        assert_eq!(p.suggest_selection(text, sp(5, 6), &options), sp(5, 6));
    }

    #[test]
    fn classify_payment_cards_by_checksum() {
        let p = pipeline();
        let options = Options::default();

        let valid = p.classify("pay 4012 8888 8888 1881", sp(4, 23), &options);
        assert_eq!(valid[0].collection, "payment_card");
        let payload = serde_json::Value::Object(valid[0].entity_data.clone().unwrap());
        assert_eq!(payload, serde_json::json!({"payment_card": {"number": "4012888888881881"}}));

        let invalid = p.classify("pay 2221 0067 4735 6282", sp(4, 23), &options);
        assert!(invalid[0].is_other());
    }

    #[test]
    fn classify_requires_an_exact_span() {
        let p = pipeline();
        let options = Options::default();
        assert_eq!(p.classify("write to a@b.com", sp(9, 16), &options)[0].collection, "email");
        assert!(p.classify("write to a@b.com", sp(8, 16), &options)[0].is_other());
    }

    #[test]
    fn classify_accepts_a_span_the_rule_matches_whole() {
        let p = pipeline();
        let options = Options::default();

        let phone = p.classify("call me at (857) 225 3556 today", sp(11, 25), &options);
        assert_eq!(phone[0].collection, "phone");
        let payload = serde_json::Value::Object(phone[0].entity_data.clone().unwrap());
        let expected = serde_json::json!({"phone": {"area_code": "857", "exchange": "225", "line_number": "3556"}});
        assert_eq!(payload, expected);

        assert_eq!(p.classify("(857) 225 3556", sp(0, 14), &options)[0].collection, "phone");
        assert_eq!(p.classify("call me at (857) 225 3556 today", sp(12, 25), &options)[0].collection, "phone");
        assert_eq!(p.classify("call me at (857) 225 3556 today", sp(12, 25), &options).len(), 1);
    }

    #[test]
    fn classify_accepts_an_entity_inside_a_longer_match() {
        let p = pipeline();
        let options = Options::default();

        let email = p.classify("mail a@b.com.au", sp(5, 12), &options);
        assert_eq!(email[0].collection, "email");
        let payload = serde_json::Value::Object(email[0].entity_data.clone().unwrap());
        assert_eq!(payload, serde_json::json!({"email": {"address": "a@b.com"}}));

        assert_eq!(p.classify("mail a@b.com.au", sp(5, 15), &options)[0].collection, "email");
        assert!(p.classify("mail a@b.com.au", sp(5, 13), &options)[0].is_other());
    }

    #[test]
    fn classify_whole_span_respects_suppression_and_confidence() {
        let p = pipeline();
        let text = "(857) 225 3556";

        let suppressed = Options { suppressed: Suppression::everywhere(["phone"]), ..Options::default() };
        assert!(p.classify(text, sp(0, 14), &suppressed)[0].is_other());
        let strict = Options { min_confidence: 0.95, ..Options::default() };
        assert!(p.classify(text, sp(0, 14), &strict)[0].is_other());
    }

    #[test]
    fn classify_guards_short_circuit_to_other() {
        let p = pipeline();
        let text = "flights LX 38 and LX 40";
        let few_tokens = Options { max_classification_tokens: Some(1), ..Options::default() };
        let short = Options { max_classification_codepoints: Some(4), ..Options::default() };

        assert_eq!(p.classify(text, sp(8, 13), &Options::default())[0].collection, "flight");
        assert!(p.classify(text, sp(8, 13), &few_tokens)[0].is_other());
        assert!(p.classify(text, sp(8, 13), &short)[0].is_other());
        assert!(p.classify(text, sp(-1, 4), &Options::default())[0].is_other());
        assert!(p.classify("LX\n38", sp(0, 5), &Options::default())[0].is_other());
    }

    #[test]
    fn annotate_finds_entities_across_lines() {
        let text = "card 4012 8888 8888 1881\nmail A@B.com on 2013-02-15";
        let spans = pipeline().annotate(text, &Options::default());
        let found: Vec<(&str, CodepointSpan)> = spans.iter().map(|s| (s.top_collection(), s.span)).collect();

        assert_eq!(found, vec![("payment_card", sp(5, 24)), ("email", sp(30, 37)), ("date", sp(41, 51))]);
        let email = serde_json::Value::Object(spans[1].top().unwrap().entity_data.clone().unwrap());
        assert_eq!(email, serde_json::json!({"email": {"address": "a@b.com"}}));
    }

    #[test]
    fn annotate_whole_text_equals_annotate_per_line() {
        let text = "call (857) 225 3556\n\nflight LX 38 tomorrow\nmail a@b.com";
        let p = pipeline();
        let options = Options::default();
        let whole = p.annotate(text, &options);

        let mut chunked = Vec::new();
        let mut begin = 0;
        for line in text.split('\n') {
            chunked.extend(p.annotate(line, &options).into_iter().map(|mut s| {
                s.span = s.span.offset(begin);
                s
            }));
            begin += line.chars().count() as i32 + 1;
        }

        assert_eq!(whole, chunked);
        assert_eq!(whole.len(), 4);
    }

    #[test]
    fn suppressed_winner_also_removes_its_neighbour() {
        let model = FixedModel(vec![cand(0, 8, "address", 1.0), cand(4, 10, "phone", 0.5)]);
        let p = Pipeline::builder(PipelineConfig::default()).with_model(Arc::new(model)).build().unwrap();
        let text = "0123456789";

        assert_eq!(p.annotate(text, &Options::default()).len(), 1);
        let options = Options { suppressed: Suppression::everywhere(["address"]), ..Options::default() };
        assert!(p.annotate(text, &options).is_empty());
    }

    #[test]
    fn config_suppression_merges_with_the_caller() {
        let mut config = PipelineConfig::default();
        config.suppressed.annotation.insert("url".into());
        let p = Pipeline::from_config(config).unwrap();
        let text = "see https://example.com or a@b.com";

        let spans = p.annotate(text, &Options::default());
        assert_eq!(spans.iter().map(|s| s.top_collection()).collect::<Vec<_>>(), vec!["email"]);

        let options = Options { suppressed: Suppression::everywhere(["email"]), ..Options::default() };
        assert!(p.annotate(text, &options).is_empty());
    }

    #[test]
    fn raw_usecase_keeps_knowledge_overlaps() {
        let knowledge = FixedKnowledge(vec![cand(0, 19, "place", 0.8)]);
        let p = Pipeline::builder(PipelineConfig::default())
            .with_rules(CompiledRules::bundled().unwrap())
            .with_knowledge(Arc::new(knowledge))
            .build()
            .unwrap();
        let text = "(857) 225 3556 East";

        let raw = p.annotate(text, &Options { usecase: Usecase::Raw, ..Options::default() });
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].source, Source::Knowledge);
        assert_eq!(raw[1].top_collection(), "phone");

        let smart = p.annotate(text, &Options::default());
        assert_eq!(smart.len(), 1);
        assert_eq!(smart[0].top_collection(), "phone");
    }

    #[test]
    fn min_confidence_drops_weak_candidates_before_resolution() {
        let text = "flight LX 38";
        let p = pipeline();
        assert_eq!(p.annotate(text, &Options::default()).len(), 1);
        assert!(p.annotate(text, &Options { min_confidence: 0.6, ..Options::default() }).is_empty());
    }

    #[test]
    fn malformed_bytes_exclude_touching_candidates() {
        let p = pipeline();
        let options = Options::default();
        let clean = p.annotate("https://example.com a@b.com", &options);
        assert_eq!(clean.len(), 2);

        let bytes = b"https://ex\xffample.com a@b.com";
        let spans = p.annotate_bytes(bytes, &options);
        assert_eq!(spans.iter().map(|s| (s.top_collection(), s.span)).collect::<Vec<_>>(), vec![("email", sp(21, 28))]);

        assert_eq!(p.suggest_selection_bytes(bytes, sp(10, 11), &options), sp(10, 11));
        assert!(p.classify_bytes(bytes, sp(0, 20), &options)[0].is_other());
        assert_eq!(p.classify_bytes(bytes, sp(21, 28), &options)[0].collection, "email");
    }

    struct AnnotationOnly;

    impl KnowledgeSource for AnnotationOnly {
        fn lookup(&self, _context: &str, _phase: Phase) -> Vec<AnnotatedSpan> {
            Vec::new()
        }

        fn phases(&self) -> PhaseSet {
            PhaseSet::ANNOTATION
        }
    }

    #[test]
    fn missing_component_fails_construction() {
        let err =
            Pipeline::builder(PipelineConfig::default()).with_knowledge(Arc::new(AnnotationOnly)).build().unwrap_err();
        assert!(matches!(err, Error::MissingComponent { phase: Phase::Selection }));

        let config = PipelineConfig { enabled_phases: vec![Phase::Annotation], ..PipelineConfig::default() };
        assert!(Pipeline::builder(config).with_knowledge(Arc::new(AnnotationOnly)).build().is_ok());
    }

    #[test]
    fn disabled_phases_degrade_to_identity() {
        let config = PipelineConfig { enabled_phases: vec![Phase::Annotation], ..PipelineConfig::default() };
        let p = Pipeline::from_config(config).unwrap();
        let options = Options::default();

        assert_eq!(p.suggest_selection("a@b.com", sp(0, 1), &options), sp(0, 1));
        assert!(p.classify("a@b.com", sp(0, 7), &options)[0].is_other());
        assert_eq!(p.annotate("a@b.com", &options).len(), 1);
    }

    #[test]
    fn annotate_verbose_reports_intermediate_state() {
        let res = pipeline().annotate_verbose("x (857) 225 3556\n2013-02-15", &Options::default());

        assert_eq!(res.spans.len(), 2);
        assert_eq!(res.details.resolved.len(), 2);
        assert_eq!(res.details.metrics.lines, 2);
        assert_eq!(res.details.metrics.candidates, res.details.candidates.len());
        assert!(res.details.metrics.sources.iter().any(|s| s.source == "patterns" && s.produced == 1));
        assert!(res.details.metrics.resolve <= res.details.metrics.total);
    }

    #[test]
    fn verbose_kept_indices_point_at_resolved_candidates() {
        let model =
            FixedModel(vec![cand(0, 8, "address", 1.0), cand(4, 10, "phone", 0.5), cand(11, 13, "flight", 0.4)]);
        let p = Pipeline::builder(PipelineConfig::default()).with_model(Arc::new(model)).build().unwrap();
        let res = p.annotate_verbose("0123456789 ab\n0123456789 ab", &Options::default());

        assert_eq!(res.details.candidates.len(), 6);
        assert_eq!(res.details.kept.len(), res.details.resolved.len());
        for (&i, resolved) in res.details.kept.iter().zip(&res.details.resolved) {
            assert_eq!(&res.details.candidates[i], resolved);
        }
        let kept: Vec<bool> = (0..6).map(|i| res.details.is_kept(i)).collect();
        assert_eq!(kept, vec![true, false, true, true, false, true]);
    }

    #[test]
    fn large_inputs_keep_offsets_exact() {
        // "call a@b.com " is 13 codepoints; the email sits at [5, 12) of each unit.
        let units = 8000;
        let text: String = (0..units)
            .map(|k| if k % 100 == 99 { "call a@b.com\n" } else { "call a@b.com " })
            .collect();
        assert_eq!(text.chars().count(), 13 * units);

        let p = pipeline();
        let options = Options::default();
        let spans = p.annotate(&text, &options);

        assert_eq!(spans.len(), units);
        for (k, span) in spans.iter().enumerate() {
            let begin = 13 * k as i32 + 5;
            assert_eq!(span.span, sp(begin, begin + 7), "unit {k}");
            assert_eq!(span.top_collection(), "email");
        }

        assert_eq!(p.suggest_selection(&text, sp(52006, 52007), &options), sp(52005, 52012));
        assert_eq!(p.suggest_selection(&text, sp(52001, 52002), &options), sp(52000, 52004));
        assert_eq!(p.classify(&text, sp(103_992, 103_999), &options)[0].collection, "email");
    }

    #[test]
    fn pipelines_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();

        let p = Arc::new(pipeline());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&p);
                std::thread::spawn(move || p.annotate("mail a@b.com", &Options::default()).len())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
    }
}
