//! unscaffold CLI - OCR scaffolding removal tool
//!
//! Cleans OCR'd document text: strips front matter, tables of contents, page
//! furniture, footnotes, citations, indexes and back matter, then reflows the prose.

mod http;

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use unscaffold::defense::{self, ChainReport};
use unscaffold::oracle::{Pricing, PromptedOracle};
use unscaffold::patterns::analyze_locally;
use unscaffold::section::DetectionKind;
use unscaffold::{
    BoundaryCandidate, BoundaryOracle, CancellationToken, MarkerStyle, OfflineOracle, Pipeline,
    PipelineConfig, PipelineError, Preset, ProgressObserver, SectionType, Step, StepResult,
};

/// OCR scaffolding removal for document text
#[derive(Parser)]
#[command(
    name = "unscaffold",
    author = "iyulab",
    version,
    about = "Strip OCR scaffolding from document text",
    long_about = "unscaffold - Removes OCR scaffolding from document text.\n\n\
                  Front matter, tables of contents, page numbers, running headers, footnotes,\n\
                  citations, indexes and back matter are located by a language model, checked\n\
                  by local validators, and removed only when the checks pass.\n\n\
                  Usage:\n  \
                  unscaffold clean <file> -o out.md      Clean a document\n  \
                  unscaffold clean <file> --offline      Clean without calling the model\n  \
                  unscaffold steps                       List pipeline steps"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a document
    Clean {
        /// Input text or Markdown file
        input: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration preset (standard, minimal, aggressive, preserve-citations)
        #[arg(long, default_value = "standard")]
        preset: Preset,

        /// JSON configuration file; overrides the preset
        #[arg(long)]
        config: Option<PathBuf>,

        /// Enable a step (repeatable)
        #[arg(long, value_name = "STEP")]
        enable: Vec<Step>,

        /// Disable a step (repeatable)
        #[arg(long, value_name = "STEP")]
        disable: Vec<Step>,

        /// Minimum words per paragraph
        #[arg(long)]
        min_words: Option<usize>,

        /// Maximum words per paragraph
        #[arg(long)]
        max_words: Option<usize>,

        /// Insert chapter markers (heading, bracketed, separator)
        #[arg(long, value_name = "STYLE")]
        chapter_markers: Option<MarkerStyle>,

        /// Write the processing report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Do not call the model; boundary steps use local heuristics and reflow is off
        #[arg(long)]
        offline: bool,

        /// Chat-completions endpoint
        #[arg(long, env = "UNSCAFFOLD_API_URL", default_value = http::DEFAULT_API_URL)]
        api_url: String,

        /// Model name
        #[arg(long, env = "UNSCAFFOLD_MODEL", default_value = http::DEFAULT_MODEL)]
        model: String,

        /// API key
        #[arg(long, env = "UNSCAFFOLD_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Price per million input tokens, for cost reporting
        #[arg(long, default_value = "0")]
        input_price: f64,

        /// Price per million output tokens, for cost reporting
        #[arg(long, default_value = "0")]
        output_price: f64,
    },

    /// List pipeline steps and whether a preset enables them
    Steps {
        #[arg(long, default_value = "standard")]
        preset: Preset,
    },

    /// Run one candidate boundary through the validation phases
    Check {
        /// Input text or Markdown file
        input: PathBuf,

        /// Section type (front-matter, table-of-contents, auxiliary-lists, index, back-matter)
        #[arg(long)]
        section: SectionType,

        /// First line of the candidate (0-based)
        #[arg(long)]
        start: usize,

        /// Line after the last line of the candidate
        #[arg(long)]
        end: usize,

        /// Confidence claimed for the candidate
        #[arg(long, default_value = "0.9")]
        confidence: f64,
    },

    /// Print the local pattern analysis as JSON
    Patterns {
        /// Input text or Markdown file
        input: PathBuf,
    },
}

fn main() {
    init_tracing();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        if let Some(PipelineError::StepFailed { completed, .. }) = e.downcast_ref::<PipelineError>() {
            eprintln!(
                "{} {} step(s) completed before the failure",
                "!".yellow().bold(),
                completed.len()
            );
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Clean {
            input,
            output,
            preset,
            config,
            enable,
            disable,
            min_words,
            max_words,
            chapter_markers,
            report,
            offline,
            api_url,
            model,
            api_key,
            input_price,
            output_price,
        } => {
            let mut options = match config {
                Some(path) => PipelineConfig::from_file(path)?,
                None => preset.config(),
            };
            for step in enable {
                options.set_step(step, true)?;
            }
            for step in disable {
                options.set_step(step, false)?;
            }
            if min_words.is_some() || max_words.is_some() {
                let current = options.paragraph_length;
                options = options.with_paragraph_length(
                    min_words.unwrap_or(current.min_words),
                    max_words.unwrap_or(current.max_words),
                );
            }
            if let Some(style) = chapter_markers {
                options = options.with_chapter_markers(style);
            }

            let oracle: Box<dyn BoundaryOracle> = match api_key {
                Some(key) if !offline => {
                    let backend = http::HttpBackend::new(&api_url, &model, &key)?;
                    tracing::info!(model = backend.model(), "using remote oracle");
                    Box::new(
                        PromptedOracle::new(backend)
                            .with_pricing(Pricing::per_million(input_price, output_price)),
                    )
                }
                _ => {
                    if !offline {
                        eprintln!(
                            "{} No API key set (UNSCAFFOLD_API_KEY); running offline",
                            "!".yellow().bold()
                        );
                    }
                    options.set_step(Step::ReflowParagraphs, false)?;
                    Box::new(OfflineOracle)
                }
            };

            let text = fs::read_to_string(&input)?;
            let document_id = input.display().to_string();

            let mut observer = SpinnerObserver::new();
            let mut pipeline = Pipeline::new(oracle);
            let result = pipeline.run_document(
                &document_id,
                &text,
                &options,
                &mut observer,
                &CancellationToken::new(),
            );
            observer.finish();
            let cleaned = result?;

            write_output(output.as_ref(), cleaned.text())?;

            let processing = cleaned.report();
            if let Some(path) = &report {
                fs::write(path, processing.to_json()?)?;
            }

            eprintln!("{}", "Cleaning Complete".green().bold());
            eprintln!("{}", "─".repeat(40));
            eprint!("{}", processing.summary());
            if let Some(path) = output {
                eprintln!("  {} {}", "✓".green(), path.display());
            }
            if let Some(path) = report {
                eprintln!("  {} {}", "✓".green(), path.display());
            }
        }

        Commands::Steps { preset } => {
            let options = preset.config();
            println!("{} ({})", "Pipeline Steps".cyan().bold(), preset.id());
            println!("{}", "─".repeat(72));
            for step in Step::ALL {
                let state = if options.is_enabled(step) {
                    "on".green()
                } else {
                    "off".dimmed()
                };
                let mandatory = if step.is_mandatory() { "mandatory" } else { "" };
                println!(
                    "{:>2}. {:<26} {:<16} {:<4} {}",
                    step.ordinal(),
                    step.id(),
                    format!("{:?}", step.method()),
                    state,
                    mandatory
                );
            }
        }

        Commands::Check {
            input,
            section,
            start,
            end,
            confidence,
        } => {
            if section.detection() != DetectionKind::Boundary {
                return Err(format!("'{}' is located by patterns, not by a line range", section).into());
            }
            let text = fs::read_to_string(&input)?;
            let candidate = BoundaryCandidate::new(start, end, confidence);
            print_chain(&defense::explain(&text, &candidate, section), section);
        }

        Commands::Patterns { input } => {
            let text = fs::read_to_string(&input)?;
            let patterns = analyze_locally(&text, &PipelineConfig::default());
            println!("{}", serde_json::to_string_pretty(&patterns)?);
        }
    }

    Ok(())
}

fn print_chain(report: &ChainReport, section: SectionType) {
    println!("{} {}", "Defense chain for".cyan().bold(), section.label());
    println!("{}", "─".repeat(40));

    let verdict = |accepted: bool, text: String| {
        if accepted {
            text.green()
        } else {
            text.red()
        }
    };

    println!(
        "{}: {}",
        "Phase A (validator)".bold(),
        verdict(report.phase_a.is_accepted(), report.phase_a.to_string())
    );
    match &report.phase_b {
        Some(verification) => {
            println!(
                "{}: {} (markers: {}; confidence {:.2})",
                "Phase B (verifier)".bold(),
                verdict(
                    verification.verdict.is_accepted(),
                    verification.verdict.to_string()
                ),
                if verification.markers_found.is_empty() {
                    "none".to_string()
                } else {
                    verification.markers_found.join(", ")
                },
                verification.confidence
            );
        }
        None => println!("{}: {}", "Phase B (verifier)".bold(), "not run".dimmed()),
    }
    match &report.phase_c {
        Some(Some(candidate)) => println!(
            "{}: lines {}..{} (confidence {:.2})",
            "Phase C (heuristic)".bold(),
            candidate.start_line,
            candidate.end_line,
            candidate.confidence
        ),
        Some(None) => println!(
            "{}: {}",
            "Phase C (heuristic)".bold(),
            "nothing found, section kept".yellow()
        ),
        None => println!("{}: {}", "Phase C (heuristic)".bold(), "not needed".dimmed()),
    }
}

/// Shows pipeline progress on a spinner.
struct SpinnerObserver {
    pb: ProgressBar,
}

impl SpinnerObserver {
    fn new() -> Self {
        Self {
            pb: create_spinner("Starting..."),
        }
    }

    fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressObserver for SpinnerObserver {
    fn on_step_start(&mut self, step: Step, position: usize, total: usize) {
        self.pb
            .set_message(format!("[{}/{}] {}...", position, total, step.label()));
    }

    fn on_step_complete(&mut self, step: Step, result: &StepResult) {
        if let Some(reason) = result.rejection {
            self.pb.suspend(|| {
                eprintln!(
                    "{} {}: model answer rejected ({})",
                    "!".yellow().bold(),
                    step.label(),
                    reason
                );
            });
        }
    }

    fn on_step_failed(&mut self, step: Step, error: &unscaffold::Error) {
        self.pb.suspend(|| {
            eprintln!("{} {}: {}", "✗".red().bold(), step.label(), error);
        });
    }

    fn on_warning(&mut self, step: Step, message: &str) {
        self.pb.suspend(|| {
            eprintln!("{} {}: {}", "!".yellow().bold(), step.label(), message);
        });
    }
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.blue} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn write_output(path: Option<&PathBuf>, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{}", content)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_step_and_preset_arguments() {
        let cli = Cli::try_parse_from([
            "unscaffold",
            "clean",
            "book.md",
            "--preset",
            "preserve-citations",
            "--disable",
            "reflow-paragraphs",
            "--offline",
        ])
        .unwrap();
        match cli.command {
            Commands::Clean {
                preset,
                disable,
                offline,
                ..
            } => {
                assert_eq!(preset, Preset::PreserveCitations);
                assert_eq!(disable, vec![Step::ReflowParagraphs]);
                assert!(offline);
            }
            _ => panic!("expected clean"),
        }
    }
}
