//! Split a long document in two and summarize each half with an LLM.
//!
//! The two summaries are written, separated by a blank line, to an output
//! file next to the input (`notes.md` → `notes_summary.md`) unless
//! `--output` names another file.
//!
//! # Examples
//!
//! ```sh
//! # Even split, summarized by the `claude` CLI
//! splitsum notes.md
//!
//! # First part gets 60% of the lines, 25 lines shared across the boundary
//! splitsum notes.md --split 60 --overlap 25
//!
//! # OpenAI-compatible endpoint (OPENAI_API_KEY or config.json)
//! splitsum notes.md --backend openai --model gpt-4o-mini
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use splitsum::config::{DEFAULT_CONFIG_FILE, resolve_from_env};
use splitsum::progress::{LoggingProgress, ProgressHandler, StdoutProgress};
use splitsum::summarizer::process::DEFAULT_PROGRAM;
use splitsum::validate::{
    validate_file, validate_model, validate_output_file, validate_overlap, validate_split,
};
use splitsum::{NetworkSummarizer, ProcessSummarizer, Summarizer, split_lines};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// The `claude` CLI in stream-json mode
    Claude,
    /// An OpenAI-compatible chat completions endpoint
    Openai,
}

/// Split a long document in two and summarize each half with an LLM.
#[derive(Parser)]
#[command(name = "splitsum", version)]
struct Cli {
    /// Document to summarize
    file: PathBuf,

    // ── Splitting ──────────────────────────────────────────────
    /// Percentage of lines assigned to the first part (1-100)
    #[arg(long, short, default_value = "50", value_parser = parse_split)]
    split: u32,

    /// Lines duplicated across the split boundary (0-99999)
    #[arg(long, short, default_value = "0", value_parser = parse_overlap)]
    overlap: u32,

    // ── Backend ────────────────────────────────────────────────
    /// Backend used for summarization
    #[arg(long, value_enum, default_value_t = Backend::Claude)]
    backend: Backend,

    /// Model override passed to the backend
    #[arg(long, short)]
    model: Option<String>,

    /// Path to the claude executable
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    claude_path: PathBuf,

    /// JSON config file with `apiKey` / `baseURL` for the openai backend
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Abort a backend call after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    // ── Output ─────────────────────────────────────────────────
    /// Output filename (default: <input stem>_summary.<ext>)
    #[arg(long, short = 'O')]
    output: Option<String>,

    /// Do not stream model output to the terminal
    #[arg(long, short)]
    quiet: bool,

    /// Enable debug logging on stderr
    #[arg(long, short)]
    verbose: bool,
}

fn parse_split(value: &str) -> Result<u32, String> {
    validate_split(value).map_err(|e| e.to_string())
}

fn parse_overlap(value: &str) -> Result<u32, String> {
    validate_overlap(value).map_err(|e| e.to_string())
}

/// `dir/notes.md` → `dir/notes_summary.md`.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{stem}_summary.{}", ext.to_string_lossy()),
        None => format!("{stem}_summary"),
    };
    input.with_file_name(name)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("splitsum=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_summarizer(
    cli: &Cli,
    progress: Arc<dyn ProgressHandler>,
) -> Result<Box<dyn Summarizer>> {
    let timeout = cli.timeout_secs.map(Duration::from_secs);
    let summarizer: Box<dyn Summarizer> = match cli.backend {
        Backend::Claude => {
            let mut s = ProcessSummarizer::new()
                .with_program(cli.claude_path.clone())
                .with_progress(progress);
            if let Some(t) = timeout {
                s = s.with_timeout(t);
            }
            Box::new(s)
        }
        Backend::Openai => {
            let config = resolve_from_env(&cli.config);
            let mut s = NetworkSummarizer::new(config)?.with_progress(progress);
            if let Some(t) = timeout {
                s = s.with_timeout(t);
            }
            Box::new(s)
        }
    };
    Ok(summarizer)
}

async fn run(cli: Cli) -> Result<PathBuf> {
    validate_file(&cli.file)?;
    let output = match &cli.output {
        Some(name) => PathBuf::from(validate_output_file(name)?),
        None => default_output_path(&cli.file),
    };
    let model = validate_model(cli.model.as_deref());

    let text = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let lines: Vec<String> = text.lines().map(String::from).collect();
    let total = lines.len();

    let parts = split_lines(&lines, cli.split, i64::from(cli.overlap))?;
    info!(
        "Split {total} lines at {}%: part 1 = {} lines, part 2 = {} lines, overlap = {}",
        cli.split,
        parts.part_a.len(),
        parts.part_b.len(),
        parts.overlap
    );

    let progress: Arc<dyn ProgressHandler> = if cli.quiet {
        Arc::new(LoggingProgress)
    } else {
        Arc::new(StdoutProgress)
    };
    let summarizer = build_summarizer(&cli, progress)?;
    debug!("Using backend: {}", summarizer.name());

    let banner = |n: usize, first: usize, last: usize| {
        if !cli.quiet {
            println!("\n── Summarizing part {n} (lines {first}-{last}) ──\n");
        }
    };

    banner(1, 1, parts.part_a.len());
    let first = summarizer
        .summarize(Some(&parts.part_a.join("\n")), model.as_deref())
        .await
        .context("failed to summarize part 1")?;

    let part_b_text = parts.part_b.join("\n");
    let combined = if part_b_text.trim().is_empty() {
        if !parts.part_b.is_empty() {
            warn!("Part 2 contains only blank lines; skipping it");
        }
        first
    } else {
        banner(2, total - parts.part_b.len() + 1, total);
        let second = summarizer
            .summarize(Some(&part_b_text), model.as_deref())
            .await
            .context("failed to summarize part 2")?;
        format!("{first}\n\n{second}")
    };

    std::fs::write(&output, format!("{combined}\n"))
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(output)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let quiet = cli.quiet;

    match run(cli).await {
        Ok(path) => {
            if !quiet {
                println!("\nSummary written to {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}
