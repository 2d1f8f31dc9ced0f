use spanwise::{AnnotateResult, AnnotatedSpan, ClassificationResult, CodepointSpan, Source};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(res: &AnnotateResult, color: bool) {
    let palette = ansi::Palette::new(color);
    let details = &res.details;
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Annotating: \"{}\"", res.text), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Sources ━━━", ansi::GRAY));
    for source in &details.metrics.sources {
        println!(
            "  {} {}  {}",
            palette.paint(format!("{:<10}", source.source), ansi::BLUE),
            if source.produced > 0 {
                palette.paint(format!("✓ {} candidates", source.produced), ansi::GREEN)
            } else {
                palette.dim(format!("✗ {} candidates", source.produced))
            },
            palette.dim(format!("{:?}", source.duration)),
        );
    }

    println!("\n{}", palette.paint("━━━ Candidates ━━━", ansi::GRAY));
    if details.candidates.is_empty() {
        println!("{}", palette.dim("  No candidates produced"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • Rules were skipped (check bucket/locale requirements)");
        println!("  • Patterns didn't match or failed verification");
        println!("  • Candidates fell below min_confidence");
        println!("\n{}", palette.dim("  Tip: Set RUST_LOG=spanwise=trace to see rule activation details"));
    } else {
        for (idx, candidate) in details.candidates.iter().enumerate() {
            let marker = if details.is_kept(idx) { palette.paint("✓", ansi::GREEN) } else { palette.dim("✗") };
            let label = palette.paint(format!("[{idx}]"), ansi::GRAY);
            println!("  {} {} {}", label, marker, fmt_span(&res.text, candidate, &palette));
        }
    }

    println!("\n{}", palette.paint("━━━ Results ━━━", ansi::GRAY));
    if res.spans.is_empty() {
        println!("{}", palette.dim("  Nothing survived resolution and filtering"));
    }
    for span in &res.spans {
        println!("  {}", fmt_span(&res.text, span, &palette));
        if let Some(data) = span.top().and_then(|r| r.entity_data.as_ref()) {
            let data = serde_json::Value::Object(data.clone()).to_string();
            println!("      {} {}", palette.dim("data:"), palette.paint(data, ansi::MAGENTA));
        }
        if let Some(info) = span.top().and_then(|r| r.datetime_info) {
            println!(
                "      {} {}  {} {:?}",
                palette.dim("utc_millis:"),
                palette.paint(info.utc_millis.to_string(), ansi::MAGENTA),
                palette.dim("│ granularity:"),
                info.granularity
            );
        }
    }

    let m = &details.metrics;
    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Resolve: {}  │  Lines: {}  │  Kept: {}/{}",
        palette.paint(format!("{:?}", m.total), ansi::GREEN),
        palette.paint(format!("{:?}", m.resolve), ansi::CYAN),
        palette.dim(m.lines.to_string()),
        palette.dim(m.kept.to_string()),
        palette.dim(m.candidates.to_string()),
    );
    println!();
}

pub fn print_selection(text: &str, click: CodepointSpan, selected: CodepointSpan, color: bool) {
    let palette = ansi::Palette::new(color);
    println!(
        "  {} {} {}  {} {} {}",
        palette.dim("click"),
        palette.paint(click.to_string(), ansi::YELLOW),
        palette.dim(quote(text, click)),
        palette.dim("→"),
        palette.bold(palette.paint(selected.to_string(), ansi::GREEN)),
        palette.paint(quote(text, selected), ansi::GREEN),
    );
}

pub fn print_classification(text: &str, span: CodepointSpan, results: &[ClassificationResult], color: bool) {
    let palette = ansi::Palette::new(color);
    println!("  {} {}", palette.paint(span.to_string(), ansi::YELLOW), palette.dim(quote(text, span)));
    for (idx, result) in results.iter().enumerate() {
        println!(
            "    {} {} {} {}",
            palette.paint(format!("[{idx}]"), ansi::GRAY),
            palette.bold(palette.paint(&result.collection, ansi::BLUE)),
            palette.dim("│ score:"),
            palette.paint(format!("{:.3} (priority {:.3})", result.score, result.priority_score), ansi::CYAN),
        );
    }
}

fn fmt_span(text: &str, span: &AnnotatedSpan, palette: &ansi::Palette) -> String {
    let source = match span.source {
        Source::Knowledge => palette.paint(" knowledge", ansi::MAGENTA),
        _ => String::new(),
    };
    format!(
        "{} {} {} {}{}",
        palette.paint(span.span.to_string(), ansi::YELLOW),
        palette.bold(palette.paint(span.top_collection(), ansi::BLUE)),
        palette.dim(format!("w={:.3}", span.weight())),
        palette.dim(quote(text, span.span)),
        source,
    )
}

/// The spanned text, or nothing when the span does not fit.
fn quote(text: &str, span: CodepointSpan) -> String {
    if span.begin < 0 || span.end < span.begin {
        return String::new();
    }
    let body: String = text.chars().skip(span.begin as usize).take(span.len()).take(80).collect();
    format!("\"{body}\"")
}
