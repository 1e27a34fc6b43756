//! CLI binary for labgrader.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, runs the batch and prints verdicts.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use labgrader::{
    grade_files, Analysis, AnalysisConfig, AppMode, DirStore, ExperimentConfig, GradingProgress,
    GradingSession, ProgressCallback, SessionStore,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

/// Shorten a message to `max_chars` characters, ellipsis included. Counts
/// chars, not bytes: error text carries Icelandic filenames and notes.
fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars - 1).collect();
        cut.push('\u{2026}');
        cut
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch, one printed line per
/// finished file.
struct CliProgress {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>2}/{len} files  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Grading");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl GradingProgress for CliProgress {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Grading {total_files} report(s)…"))
        ));
    }

    fn on_file_start(&self, _index: usize, filename: &str) {
        self.bar.set_message(filename.to_string());
    }

    fn on_file_complete(&self, _index: usize, filename: &str) {
        self.bar
            .println(format!("  {} {}", green("✓"), filename));
        self.bar.inc(1);
    }

    fn on_file_error(&self, _index: usize, filename: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = ellipsize(error, 80);
        self.bar
            .println(format!("  {} {}  {}", red("✗"), filename, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} report(s) graded",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} report(s) graded  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                succeeded + failed,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Grade a class set against the built-in equilibrium rubric
  labgrade reports/*.docx

  # Use a custom rubric and save the run
  labgrade --experiment rubrics/titration.json --save-session reports/*.pdf

  # Student mode: feedback for a single report
  labgrade --mode student my_report.docx

  # JSON output for scripting
  labgrade --json reports/*.docx > results.json

  # List saved sessions
  labgrade --list-sessions

SUPPORTED FILE TYPES:
  .docx           converted to markdown via pandoc (must be installed)
  .pdf            text + rendered pages via pdfium
  .png .jpg .jpeg .gif .webp .bmp .tif  photographed/scanned reports

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY   Anthropic API key (CLAUDE_API_KEY also accepted)
  OPENAI_API_KEY      OpenAI API key
  GRADING_MODEL       Override model ID
"#;

/// Grade chemistry lab reports with Vision Language Models.
#[derive(Parser, Debug)]
#[command(
    name = "labgrade",
    version,
    about = "Grade chemistry lab reports (.docx/.pdf/images) using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Report files to grade (.docx, .pdf or images).
    files: Vec<PathBuf>,

    /// Rubric JSON file. Default: the built-in equilibrium experiment.
    #[arg(short, long, env = "LABGRADE_EXPERIMENT")]
    experiment: Option<PathBuf>,

    /// Grading pipeline: teacher (batch verdicts) or student (feedback).
    #[arg(short, long, env = "LABGRADE_MODE", default_value = "teacher")]
    mode: String,

    /// LLM model ID (e.g. claude-sonnet-4-20250514).
    #[arg(long, env = "GRADING_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama.
    #[arg(long, env = "LABGRADE_PROVIDER")]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "LABGRADE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Per-file LLM call timeout in seconds.
    #[arg(long, env = "LABGRADE_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Output structured JSON instead of the text summary.
    #[arg(long, env = "LABGRADE_JSON")]
    json: bool,

    /// Save this run as a session (teacher mode only).
    #[arg(long)]
    save_session: bool,

    /// Name for the saved session. Default: timestamp.
    #[arg(long)]
    session_name: Option<String>,

    /// Directory for saved sessions.
    #[arg(long, env = "LABGRADE_SESSIONS_DIR", default_value = "sessions")]
    sessions_dir: PathBuf,

    /// List saved sessions and exit.
    #[arg(long)]
    list_sessions: bool,

    /// Disable the progress bar.
    #[arg(long, env = "LABGRADE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LABGRADE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, env = "LABGRADE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let sessions = SessionStore::new(Arc::new(DirStore::new(&cli.sessions_dir)));

    if cli.list_sessions {
        return list_sessions(&sessions, cli.json).await;
    }

    if cli.files.is_empty() {
        anyhow::bail!("No report files given");
    }

    let mode: AppMode = cli
        .mode
        .parse()
        .context("Invalid --mode (expected teacher or student)")?;

    let experiment = match cli.experiment {
        Some(ref path) => ExperimentConfig::from_json_file(path)
            .with_context(|| format!("Failed to load rubric from {}", path.display()))?,
        None => ExperimentConfig::default_equilibrium(),
    };

    let mut builder = AnalysisConfig::builder()
        .mode(mode)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout);
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as ProgressCallback)
    } else {
        None
    };

    let results = grade_files(&cli.files, &experiment, &config, progress).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialise results")?
        );
    } else {
        print_results(&results, &experiment);
    }

    if cli.save_session {
        if mode != AppMode::Teacher {
            anyhow::bail!("--save-session only applies to teacher mode");
        }
        let teacher_results = results
            .iter()
            .filter_map(|r| match r {
                Analysis::Teacher(result) => Some(result.clone()),
                Analysis::Student(_) => None,
            })
            .collect::<Vec<_>>();
        let session = GradingSession {
            id: SessionStore::generate_session_id(),
            name: cli
                .session_name
                .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d %H:%M").to_string()),
            experiment: experiment.id.clone(),
            timestamp: chrono::Utc::now(),
            mode,
            file_count: teacher_results.len(),
            results: teacher_results,
        };
        sessions
            .save_session(&session)
            .await
            .context("Failed to save session")?;
        if !cli.quiet {
            eprintln!("{} session saved as {}", green("✔"), bold(&session.id));
        }
    }

    Ok(())
}

/// Print saved sessions, newest first.
async fn list_sessions(store: &SessionStore, as_json: bool) -> Result<()> {
    let sessions = store
        .load_saved_sessions()
        .await
        .context("Failed to load sessions")?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }
    for s in &sessions {
        println!(
            "{}  {}  {}  {} file(s)",
            dim(&s.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            bold(&s.id),
            s.name,
            s.file_count,
        );
    }
    Ok(())
}

/// Render the text summary for a finished batch.
fn print_results(results: &[Analysis], experiment: &ExperimentConfig) {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for analysis in results {
        let _ = writeln!(out, "\n{}", bold(analysis.filename()));
        if let Some(error) = analysis.error() {
            let _ = writeln!(out, "  {} {}", red("✗"), error);
            continue;
        }

        match analysis {
            Analysis::Teacher(result) => {
                // Rubric order, not map order.
                if let Some(ref sections) = result.sections {
                    for section in &experiment.sections {
                        let Some(verdict) = sections.get(&section.id) else {
                            continue;
                        };
                        let mark = if !verdict.present {
                            red("✗ missing")
                        } else {
                            match verdict.quality {
                                Some(labgrader::report::Quality::Good) => green("✓ good"),
                                Some(labgrader::report::Quality::NeedsImprovement) => {
                                    yellow("~ needs improvement")
                                }
                                Some(labgrader::report::Quality::Unsatisfactory) => {
                                    red("✗ unsatisfactory")
                                }
                                None => dim("present"),
                            }
                        };
                        let points = match (verdict.points, verdict.max_points) {
                            (Some(p), Some(max)) => dim(&format!("  {p}/{max}")),
                            _ => String::new(),
                        };
                        let _ = writeln!(out, "  {:<20} {mark}{points}", section.name);
                        if let Some(ref note) = verdict.note {
                            let _ = writeln!(out, "    {}", dim(note));
                        }
                    }
                }
                if let (Some(total), Some(max)) = (result.total_points, result.max_total_points) {
                    let _ = writeln!(out, "  {}", bold(&format!("Points: {total}/{max}")));
                }
                if let Some(ref grade) = result.suggested_grade {
                    let _ = writeln!(out, "  {}", bold(&format!("Suggested grade: {grade}")));
                }
            }
            Analysis::Student(feedback) => {
                if let Some(ref overall) = feedback.overall_assessment {
                    let _ = writeln!(out, "  {overall}");
                }
                if let Some(ref sections) = feedback.sections {
                    for section in &experiment.sections {
                        let Some(fb) = sections.get(&section.id) else {
                            continue;
                        };
                        let _ = writeln!(out, "  {}", bold(&section.name));
                        for s in &fb.strengths {
                            let _ = writeln!(out, "    {} {s}", green("+"));
                        }
                        for i in &fb.improvements {
                            let _ = writeln!(out, "    {} {i}", yellow("~"));
                        }
                        for s in &fb.suggestions {
                            let _ = writeln!(out, "    {} {s}", cyan("→"));
                        }
                    }
                }
                if !feedback.next_steps.is_empty() {
                    let _ = writeln!(out, "  {}", bold("Next steps:"));
                    for step in &feedback.next_steps {
                        let _ = writeln!(out, "    • {step}");
                    }
                }
            }
        }
    }
}
