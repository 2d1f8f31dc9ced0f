mod debug_report;

use chrono::{DateTime, NaiveDateTime, Utc};
use spanwise::{CodepointSpan, CompiledRules, Options, Pipeline, PipelineConfig, RuleSet, Usecase};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_REFERENCE: &str = "2013-02-12T04:30:00";

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let pipeline = match build_pipeline(&cli) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    let options = Options {
        locales: cli.locales.clone(),
        usecase: cli.usecase,
        reference_time: cli.reference_time,
        ..Options::default()
    };

    match cli.mode {
        Mode::Annotate => {
            let res = pipeline.annotate_verbose(&cli.input, &options);
            if cli.json {
                print_json(&res.spans);
            } else {
                debug_report::print_run(&res, cli.color);
            }
        }
        Mode::Select(click) => {
            let span = pipeline.suggest_selection(&cli.input, click, &options);
            if cli.json {
                print_json(&span);
            } else {
                debug_report::print_selection(&cli.input, click, span, cli.color);
            }
        }
        Mode::Classify(span) => {
            let results = pipeline.classify(&cli.input, span, &options);
            if cli.json {
                print_json(&results);
            } else {
                debug_report::print_classification(&cli.input, span, &results, cli.color);
            }
        }
    }
}

fn build_pipeline(cli: &CliConfig) -> spanwise::Result<Pipeline> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    match &cli.rules {
        Some(path) => {
            let rules = CompiledRules::compile(&RuleSet::from_path(path)?)?;
            Pipeline::from_rules(config, Arc::new(rules))
        }
        None => Pipeline::from_config(config),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("error: failed to serialize output: {err}");
            std::process::exit(1);
        }
    }
}

enum Mode {
    Annotate,
    Select(CodepointSpan),
    Classify(CodepointSpan),
}

struct CliConfig {
    input: String,
    mode: Mode,
    rules: Option<PathBuf>,
    config: Option<PathBuf>,
    locales: Vec<String>,
    usecase: Usecase,
    reference_time: DateTime<Utc>,
    json: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut mode = Mode::Annotate;
    let mut rules = None;
    let mut config = None;
    let mut locales: Vec<String> = Vec::new();
    let mut usecase = Usecase::Smart;
    let mut reference_time = parse_reference(DEFAULT_REFERENCE)?;
    let mut json = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            match inline.clone() {
                Some(v) => Ok(v),
                None => args.next().ok_or_else(|| format!("error: {name} expects a value")),
            }
        };

        match flag.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("spanwise {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--json" => json = true,
            "--rules" => rules = Some(PathBuf::from(value("--rules")?)),
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--locale" => locales.push(value("--locale")?),
            "--usecase" => usecase = parse_usecase(&value("--usecase")?)?,
            "--reference" => reference_time = parse_reference(&value("--reference")?)?,
            "--select" => mode = Mode::Select(parse_span(&value("--select")?)?),
            "--classify" => mode = Mode::Classify(parse_span(&value("--classify")?)?),
            "--input" | "-i" => {
                let v = value("--input")?;
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(v);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    if input.is_some() {
                        return Err("error: input provided multiple times".to_string());
                    }
                    input = Some(rest);
                }
                break;
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(rest);
                break;
            }
        }
    }

    let input = match input {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if input.trim().is_empty() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }
    if locales.is_empty() {
        locales.push("en".to_string());
    }

    Ok(CliConfig { input, mode, rules, config, locales, usecase, reference_time, json, color })
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer.trim_end_matches('\n').to_string())
}

fn parse_reference(value: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("error: invalid --reference '{value}' (expected YYYY-MM-DDTHH:MM:SS)"))
}

fn parse_usecase(value: &str) -> Result<Usecase, String> {
    match value {
        "smart" => Ok(Usecase::Smart),
        "raw" => Ok(Usecase::Raw),
        _ => Err(format!("error: invalid --usecase '{value}' (expected smart or raw)")),
    }
}

fn parse_span(value: &str) -> Result<CodepointSpan, String> {
    let invalid = || format!("error: invalid span '{value}' (expected BEGIN:END)");
    let (begin, end) = value.split_once(':').ok_or_else(invalid)?;
    let begin = begin.trim().parse::<i32>().map_err(|_| invalid())?;
    let end = end.trim().parse::<i32>().map_err(|_| invalid())?;
    Ok(CodepointSpan::new(begin, end))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "spanwise {version}

Candidate annotation CLI: recognizes entities in text and shows how
overlapping candidates were resolved.

Usage:
  spanwise [OPTIONS] [--] <input...>
  spanwise [OPTIONS] --input <text>

Options:
  -i, --input <text>         Input text. If omitted, reads remaining args
                             or stdin when no args are provided.
  --select <B:E>             Suggest a selection for the click span B:E.
  --classify <B:E>           Classify the span B:E.
  --rules <file>             Rule set JSON to use instead of the bundled one.
  --config <file>            Pipeline config JSON.
  --locale <tag>             Requested locale; repeatable. Default: en
  --usecase <smart|raw>      Overlap policy. Default: smart
  --reference <timestamp>    Reference time (UTC) in YYYY-MM-DDTHH:MM:SS.
                             Default: {default_reference}
  --json                     Print results as JSON.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Logging goes to stderr and is controlled by RUST_LOG (default: warn).

Exit codes:
  0  Success.
  1  Rule set or config could not be loaded.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        default_reference = DEFAULT_REFERENCE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spans_and_usecases() {
        assert_eq!(parse_span("12:15").unwrap(), CodepointSpan::new(12, 15));
        assert_eq!(parse_span("-1: 4").unwrap(), CodepointSpan::new(-1, 4));
        assert!(parse_span("12").is_err());
        assert!(parse_span("a:b").is_err());

        assert_eq!(parse_usecase("raw").unwrap(), Usecase::Raw);
        assert!(parse_usecase("loose").is_err());
    }

    #[test]
    fn parses_reference_as_utc() {
        let reference = parse_reference(DEFAULT_REFERENCE).unwrap();
        assert_eq!(reference.to_rfc3339(), "2013-02-12T04:30:00+00:00");
        assert!(parse_reference("yesterday").is_err());
    }
}
