//! CLI binary for pdf2ledger.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2ledger::{run, PipelineConfig, RunProgress, WriteMode};
use std::io;
use std::path::{Path, PathBuf};
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the discovered files, with a
/// per-file log line as each invoice completes or is skipped.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} invoices  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl RunProgress for CliProgress {
    fn on_run_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} invoices…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, path: &Path) {
        self.bar.set_message(path.display().to_string());
    }

    fn on_file_done(&self, index: usize, total: usize, records: usize) {
        self.bar.println(format!(
            "  {} Invoice {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{records} record(s)")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let msg = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Invoice {:>3}/{:<3}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, processed: usize, skipped: usize) {
        self.bar.finish_and_clear();
        if skipped == 0 {
            eprintln!(
                "{} {} invoices processed",
                green("✔"),
                bold(&processed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} invoices processed  ({} skipped)",
                if processed == 0 { red("✘") } else { cyan("⚠") },
                bold(&processed.to_string()),
                processed + skipped,
                red(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Append this run's invoices to facturas.db
  pdf2ledger

  # Replace the table instead of appending
  pdf2ledger --overwrite

  # Different folder and database
  pdf2ledger --input-dir ./2024/facturas --db-url sqlite://ledger.db

  # Use a fallback model for overload errors
  pdf2ledger --model gemini-2.0-flash --fallback-model gemini-1.5-flash

  # Generate sample invoices to try the tool
  pdf2ledger demo --random 5

  # Structured summary for scripts
  pdf2ledger --json

ENVIRONMENT VARIABLES (also read from ./.env):
  GEMINI_API_KEY            API key for the default gemini provider
  MODEL_NAME                Primary model           (--model)
  FALLBACK_MODEL            Overload fallback model (--fallback-model)
  MAX_OUTPUT_TOKENS         Output cap per invoice  (--max-output-tokens)
  TEMPERATURE               Sampling temperature    (--temperature)
  LLM_RETRIES               Attempts per invoice    (--max-retries)
  BACKOFF_BASE_MS / BACKOFF_MAX_MS / BACKOFF_JITTER_MS
  LLM_METRICS_CSV           Usage metrics log       (--metrics-csv)
  FALLBACK_RATE_USD_COP     Fixed USD→COP rate      (--rate-usd)
  FALLBACK_RATE_EUR_COP     Fixed EUR→COP rate      (--rate-eur)
  RUST_LOG                  Tracing filter override

SETUP:
  1. Set API key:          export GEMINI_API_KEY=...
  2. Drop PDFs into:       ./facturas/   (flat or one level of subfolders)
  3. Run:                  pdf2ledger
"#;

/// Extract invoice records from PDFs with an LLM and load them into SQLite.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2ledger",
    version,
    about = "Extract invoice records from PDF files and load them into SQLite",
    long_about = "Scans a folder of PDF invoices, asks an LLM to normalise each one into \
date/vendor/concept/amount/currency records, converts USD and EUR amounts into COP at fixed \
rates, and writes the result to the `facturas` table of a SQLite database.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Replace the facturas table instead of appending to it.
    #[arg(long)]
    overwrite: bool,

    /// Folder scanned for PDF invoices.
    #[arg(long, env = "PDF2LEDGER_INPUT_DIR", default_value = "./facturas")]
    input_dir: PathBuf,

    /// SQLite URL of the ledger database.
    #[arg(long, env = "PDF2LEDGER_DB_URL", default_value = "sqlite://facturas.db")]
    db_url: String,

    /// Primary model identifier.
    #[arg(long, env = "MODEL_NAME", default_value = "gemini-2.0-flash")]
    model: String,

    /// Model substituted after a detected overload error.
    #[arg(long, env = "FALLBACK_MODEL")]
    fallback_model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, …
    #[arg(long, env = "PDF2LEDGER_PROVIDER")]
    provider: Option<String>,

    /// Max model output tokens per invoice.
    #[arg(long, env = "MAX_OUTPUT_TOKENS", default_value_t = 512)]
    max_output_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Total structuring attempts per invoice.
    #[arg(long, env = "LLM_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Base backoff delay in milliseconds.
    #[arg(long, env = "BACKOFF_BASE_MS", default_value_t = 1000)]
    backoff_base_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[arg(long, env = "BACKOFF_MAX_MS", default_value_t = 30000)]
    backoff_max_ms: u64,

    /// Upper bound of the random jitter added to each backoff, in milliseconds.
    #[arg(long, env = "BACKOFF_JITTER_MS", default_value_t = 500)]
    backoff_jitter_ms: u64,

    /// Path of the per-attempt usage-metrics CSV.
    #[arg(long, env = "LLM_METRICS_CSV", default_value = "llm_usage.csv")]
    metrics_csv: PathBuf,

    /// Fixed USD→COP conversion rate.
    #[arg(long, env = "FALLBACK_RATE_USD_COP", default_value_t = 4500.0)]
    rate_usd: f64,

    /// Fixed EUR→COP conversion rate.
    #[arg(long, env = "FALLBACK_RATE_EUR_COP", default_value_t = 4900.0)]
    rate_eur: f64,

    /// Print the run summary as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate sample invoice PDFs into the input folder.
    Demo {
        /// How many randomised invoices to add on top of the fixed four.
        #[arg(long, default_value_t = 5)]
        random: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load ./.env before clap resolves `env =` attributes.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the per-file feedback, so INFO logs are
    // suppressed while it is active; `RUST_LOG` always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Demo subcommand ──────────────────────────────────────────────────
    if let Some(Command::Demo { random }) = cli.command {
        std::fs::create_dir_all(&cli.input_dir).with_context(|| {
            format!("Failed to create invoice folder {}", cli.input_dir.display())
        })?;
        let created = pdf2ledger::demo::generate_demo_invoices(&cli.input_dir, random)
            .context("Demo generation failed")?;
        if !cli.quiet {
            for path in &created {
                eprintln!("  {} {}", green("+"), path.display());
            }
            eprintln!(
                "{} {} demo invoices written to {}",
                green("✔"),
                bold(&created.len().to_string()),
                cli.input_dir.display()
            );
        }
        return Ok(());
    }

    // ── Build config and run ─────────────────────────────────────────────
    let config = build_config(&cli, show_progress)?;
    let output = run(&config).await.context("Invoice run failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise run summary")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} rows → {}  ({})",
            green("✔"),
            bold(&output.records_written.to_string()),
            bold(&cli.db_url),
            if cli.overwrite { "replaced" } else { "appended" },
        );
        if output.stats.usd_converted + output.stats.eur_converted > 0 {
            eprintln!(
                "   {} converted to COP: {} USD, {} EUR",
                dim("💱"),
                output.stats.usd_converted,
                output.stats.eur_converted,
            );
        }
        eprintln!(
            "   {}",
            dim(&format!(
                "{}ms total, {}ms in LLM calls",
                output.stats.total_duration_ms, output.stats.llm_duration_ms
            ))
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, show_progress: bool) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .input_dir(&cli.input_dir)
        .db_url(&cli.db_url)
        .write_mode(if cli.overwrite {
            WriteMode::Replace
        } else {
            WriteMode::Append
        })
        .model(&cli.model)
        .temperature(cli.temperature)
        .max_output_tokens(cli.max_output_tokens)
        .max_retries(cli.max_retries)
        .backoff_base_ms(cli.backoff_base_ms)
        .backoff_max_ms(cli.backoff_max_ms)
        .backoff_jitter_ms(cli.backoff_jitter_ms)
        .metrics_path(&cli.metrics_csv)
        .rate_usd(cli.rate_usd)
        .rate_eur(cli.rate_eur);

    if let Some(ref model) = cli.fallback_model {
        builder = builder.fallback_model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if show_progress {
        builder = builder.progress(CliProgress::new());
    }

    builder.build().context("Invalid configuration")
}
