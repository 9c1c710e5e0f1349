//! End-to-end pipeline entry point.
//!
//! [`run`] executes the whole ETL pass eagerly: discover → (extract →
//! structure → parse) per file → normalize → persist. Execution is strictly
//! sequential — invoices arrive in the tens, not the thousands, and serial
//! calls keep the tool far away from provider rate limits without any tuning.
//!
//! Per-file failures are isolated: a corrupted PDF or an exhausted
//! structuring call logs a WARN, skips the file, and the run continues. Only
//! a missing input folder, an empty discovery, a database failure, or zero
//! successful records abort the run.

use crate::config::PipelineConfig;
use crate::db::InvoiceStore;
use crate::error::{EtlError, FileError};
use crate::metrics::UsageLog;
use crate::model::{FxRates, InvoiceBatch, InvoiceRecord};
use crate::pipeline::normalize::{normalize_currencies, ConversionSummary};
use crate::pipeline::structure::{GenerativeModel, LlmModel, RetryPolicy, Structurer};
use crate::pipeline::{discover, extract, parse};
use crate::prompts::INVOICE_PROMPT;
use edgequake_llm::ProviderFactory;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Run statistics, filled in as the pipeline progresses.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// PDF files discovered under the input folder.
    pub files_found: usize,
    /// Files that produced at least a parsed (possibly empty) record set.
    pub files_processed: usize,
    /// Files skipped with a non-fatal error.
    pub files_skipped: usize,
    /// Records converted from USD / EUR into COP.
    pub usd_converted: usize,
    pub eur_converted: usize,
    /// Wall-clock time of the whole run.
    pub total_duration_ms: u64,
    /// Time spent inside structuring calls (including backoff sleeps).
    pub llm_duration_ms: u64,
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// Rows inserted into the `facturas` table.
    pub records_written: u64,
    pub stats: RunStats,
}

/// Execute one full ETL pass with the given configuration.
///
/// # Errors
/// Returns `Err(EtlError)` only for fatal conditions:
/// - input folder missing or unreadable
/// - no PDF files found
/// - no LLM provider configured
/// - zero files processed successfully (nothing to persist)
/// - database failure
pub async fn run(config: &PipelineConfig) -> Result<RunOutput, EtlError> {
    let total_start = Instant::now();
    info!("Starting invoice run over {}", config.input_dir.display());

    // ── Step 1: Discover files ───────────────────────────────────────────
    let files = discover::discover_invoices(&config.input_dir)?;
    if files.is_empty() {
        return Err(EtlError::NoPdfsFound {
            path: config.input_dir.clone(),
        });
    }
    info!("Found {} invoice files", files.len());
    if let Some(ref cb) = config.progress {
        cb.on_run_start(files.len());
    }

    // ── Step 2: Build the structurer ─────────────────────────────────────
    let (primary, fallback) = resolve_models(config)?;
    let structurer = Structurer::new(
        primary,
        fallback,
        RetryPolicy {
            max_attempts: config.max_retries,
            base_ms: config.backoff_base_ms,
            cap_ms: config.backoff_max_ms,
            jitter_ms: config.backoff_jitter_ms,
        },
        UsageLog::new(&config.metrics_path),
    );

    // ── Step 3: Process each file, isolating failures ────────────────────
    let mut batch = InvoiceBatch::new();
    let mut processed = 0usize;
    let mut skipped = 0usize;
    let mut llm_duration = Duration::ZERO;

    for (i, path) in files.iter().enumerate() {
        info!("Processing invoice {}", path.display());
        if let Some(ref cb) = config.progress {
            cb.on_file_start(i + 1, files.len(), path);
        }

        match process_file(&structurer, path, &mut llm_duration).await {
            Ok(records) => {
                processed += 1;
                if let Some(ref cb) = config.progress {
                    cb.on_file_done(i + 1, files.len(), records.len());
                }
                batch.extend(records);
            }
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                skipped += 1;
                if let Some(ref cb) = config.progress {
                    cb.on_file_error(i + 1, files.len(), &e.to_string());
                }
            }
        }
    }

    if let Some(ref cb) = config.progress {
        cb.on_run_complete(processed, skipped);
    }

    if batch.is_empty() {
        return Err(EtlError::NoRecords { files: files.len() });
    }
    info!("Parsed {} records from {processed} files", batch.len());

    // ── Step 4: Normalize currencies ─────────────────────────────────────
    let summary: ConversionSummary = normalize_currencies(
        &mut batch,
        &FxRates {
            usd_to_cop: config.rate_usd,
            eur_to_cop: config.rate_eur,
        },
    );

    // ── Step 5: Persist ──────────────────────────────────────────────────
    let store = InvoiceStore::connect(&config.db_url).await?;
    let records_written = store.write_batch(&batch, config.write_mode).await?;

    let stats = RunStats {
        files_found: files.len(),
        files_processed: processed,
        files_skipped: skipped,
        usd_converted: summary.usd_converted,
        eur_converted: summary.eur_converted,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        llm_duration_ms: llm_duration.as_millis() as u64,
    };
    info!(
        "Run complete: {records_written} rows written, {}/{} files, {}ms total",
        processed,
        files.len(),
        stats.total_duration_ms
    );

    Ok(RunOutput {
        records_written,
        stats,
    })
}

/// Extract, structure, and parse one invoice file.
async fn process_file(
    structurer: &Structurer,
    path: &Path,
    llm_duration: &mut Duration,
) -> Result<Vec<InvoiceRecord>, FileError> {
    let text = extract::extract_text(path).await?;
    let llm_start = Instant::now();
    let structured = structurer.structure(&text).await?;
    *llm_duration += llm_start.elapsed();
    parse::parse_response(&structured)
}

/// Resolve the primary and fallback models, most-specific first.
///
/// 1. **Pre-built clients** (`config.client` / `config.fallback_client`) —
///    the caller constructed the models entirely; used as-is. This is the
///    seam tests use to script responses without a network.
/// 2. **Provider name + model identifiers** — the factory reads the matching
///    API key (`GEMINI_API_KEY`, `OPENAI_API_KEY`, …) from the environment.
///    The provider name defaults to `gemini`, matching the default models.
fn resolve_models(
    config: &PipelineConfig,
) -> Result<(Arc<dyn GenerativeModel>, Option<Arc<dyn GenerativeModel>>), EtlError> {
    if let Some(ref client) = config.client {
        return Ok((Arc::clone(client), config.fallback_client.clone()));
    }

    let provider_name = config.provider_name.as_deref().unwrap_or("gemini");
    let primary = build_model(config, provider_name, &config.model)?;
    let fallback = match config.fallback_model.as_deref() {
        Some(model) => Some(build_model(config, provider_name, model)?),
        None => None,
    };
    Ok((primary, fallback))
}

fn build_model(
    config: &PipelineConfig,
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn GenerativeModel>, EtlError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        EtlError::ProviderNotConfigured {
            hint: format!(
                "Could not initialise provider '{provider_name}' for model '{model}'.\n\
                 Set the matching API key (e.g. GEMINI_API_KEY) or pick another\n\
                 provider with --provider.\nError: {e}"
            ),
        }
    })?;
    let instruction = config.instruction.as_deref().unwrap_or(INVOICE_PROMPT);
    Ok(Arc::new(LlmModel::new(
        provider,
        model,
        instruction,
        config.temperature,
        config.max_output_tokens,
    )))
}
