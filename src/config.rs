//! Configuration types for an invoice ETL run.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to pass the same run parameters to each stage, serialise them for
//! logging, and diff two runs to understand why their outputs differ.
//!
//! # Design choice: explicit config over ambient environment
//! The predecessor of this tool read `MODEL_NAME`, retry counts, and FX rates
//! from module-level environment globals inside its logic functions, which
//! made deterministic testing impossible. Here the environment is consulted
//! exactly once — in the CLI — and everything downstream receives this
//! immutable struct.

use crate::error::EtlError;
use crate::pipeline::structure::GenerativeModel;
use crate::progress::RunProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// How the final batch is written into the `facturas` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteMode {
    /// Clear the table first; only this run's rows remain.
    Replace,
    /// Keep existing rows and add this run's rows. (default)
    #[default]
    Append,
}

/// Configuration for one ETL run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2ledger::{PipelineConfig, WriteMode};
///
/// let config = PipelineConfig::builder()
///     .input_dir("./facturas")
///     .model("gemini-2.0-flash")
///     .fallback_model("gemini-1.5-flash")
///     .max_retries(5)
///     .write_mode(WriteMode::Replace)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Folder scanned for PDF invoices (flat files plus one level of
    /// subfolders). Default: `./facturas`.
    pub input_dir: PathBuf,

    /// SQLite connection URL for the ledger. Default: `sqlite://facturas.db`.
    pub db_url: String,

    /// Replace or append the `facturas` table. Default: Append.
    pub write_mode: WriteMode,

    /// Primary model identifier, e.g. "gemini-2.0-flash". Default: `gemini-2.0-flash`.
    pub model: String,

    /// Secondary model substituted after a detected overload error.
    ///
    /// The switch happens at most once per structuring call and persists for
    /// the remaining attempts of that call. If `None`, overload errors are
    /// retried against the primary like any other failure.
    pub fallback_model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    /// If `None`, the provider is auto-detected from API-key env vars.
    pub provider_name: Option<String>,

    /// Pre-constructed primary model client. Takes precedence over
    /// `provider_name`/`model`. Intended for tests and custom middleware.
    pub client: Option<Arc<dyn GenerativeModel>>,

    /// Pre-constructed fallback model client, paired with `client`.
    pub fallback_client: Option<Arc<dyn GenerativeModel>>,

    /// Sampling temperature for the structuring call. Default: 0.0.
    ///
    /// Zero keeps the model deterministic and faithful to the invoice text —
    /// exactly what a fixed-schema transcription wants. Anything creative
    /// only invents vendors and amounts.
    pub temperature: f32,

    /// Maximum tokens the model may generate per invoice. Default: 512.
    ///
    /// An invoice normalises to a handful of short CSV lines; 512 covers
    /// multi-item invoices while keeping a runaway response cheap.
    pub max_output_tokens: usize,

    /// Total structuring attempts per invoice (first try included). Default: 5.
    ///
    /// Most 5xx and timeout errors are transient. Permanent failures still
    /// cost at most `max_retries` calls before the file is skipped.
    pub max_retries: u32,

    /// Base backoff delay in milliseconds. Default: 1000.
    ///
    /// Doubles after each attempt: 1 s → 2 s → 4 s → …, capped by
    /// `backoff_max_ms`. Exponential backoff gives an overloaded endpoint
    /// room to recover instead of hammering it at a fixed interval.
    pub backoff_base_ms: u64,

    /// Backoff ceiling in milliseconds. Default: 30 000.
    pub backoff_max_ms: u64,

    /// Upper bound of the uniform random jitter added to every backoff
    /// sleep, in milliseconds. Default: 500.
    pub backoff_jitter_ms: u64,

    /// Path of the per-attempt usage-metrics CSV. Default: `llm_usage.csv`.
    pub metrics_path: PathBuf,

    /// Fixed USD→COP conversion rate. Default: 4500.
    pub rate_usd: f64,

    /// Fixed EUR→COP conversion rate. Default: 4900.
    pub rate_eur: f64,

    /// Custom structuring instruction. If `None`, uses
    /// [`crate::prompts::INVOICE_PROMPT`].
    pub instruction: Option<String>,

    /// Optional per-file progress callback.
    pub progress: Option<Arc<dyn RunProgress>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./facturas"),
            db_url: "sqlite://facturas.db".to_string(),
            write_mode: WriteMode::Append,
            model: "gemini-2.0-flash".to_string(),
            fallback_model: None,
            provider_name: None,
            client: None,
            fallback_client: None,
            temperature: 0.0,
            max_output_tokens: 512,
            max_retries: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            backoff_jitter_ms: 500,
            metrics_path: PathBuf::from("llm_usage.csv"),
            rate_usd: 4_500.0,
            rate_eur: 4_900.0,
            instruction: None,
            progress: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_dir", &self.input_dir)
            .field("db_url", &self.db_url)
            .field("write_mode", &self.write_mode)
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("provider_name", &self.provider_name)
            .field("client", &self.client.as_ref().map(|_| "<dyn GenerativeModel>"))
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("backoff_max_ms", &self.backoff_max_ms)
            .field("backoff_jitter_ms", &self.backoff_jitter_ms)
            .field("metrics_path", &self.metrics_path)
            .field("rate_usd", &self.rate_usd)
            .field("rate_eur", &self.rate_eur)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn db_url(mut self, url: impl Into<String>) -> Self {
        self.config.db_url = url.into();
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.config.fallback_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn client(mut self, client: Arc<dyn GenerativeModel>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn fallback_client(mut self, client: Arc<dyn GenerativeModel>) -> Self {
        self.config.fallback_client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn backoff_base_ms(mut self, ms: u64) -> Self {
        self.config.backoff_base_ms = ms;
        self
    }

    pub fn backoff_max_ms(mut self, ms: u64) -> Self {
        self.config.backoff_max_ms = ms;
        self
    }

    pub fn backoff_jitter_ms(mut self, ms: u64) -> Self {
        self.config.backoff_jitter_ms = ms;
        self
    }

    pub fn metrics_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.metrics_path = path.into();
        self
    }

    pub fn rate_usd(mut self, rate: f64) -> Self {
        self.config.rate_usd = rate;
        self
    }

    pub fn rate_eur(mut self, rate: f64) -> Self {
        self.config.rate_eur = rate;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn progress(mut self, cb: Arc<dyn RunProgress>) -> Self {
        self.config.progress = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, EtlError> {
        let c = &self.config;
        if c.max_retries == 0 {
            return Err(EtlError::InvalidConfig(
                "max_retries must be ≥ 1 (it counts total attempts)".into(),
            ));
        }
        if !(c.rate_usd.is_finite() && c.rate_usd > 0.0) {
            return Err(EtlError::InvalidConfig(format!(
                "rate_usd must be a positive number, got {}",
                c.rate_usd
            )));
        }
        if !(c.rate_eur.is_finite() && c.rate_eur > 0.0) {
            return Err(EtlError::InvalidConfig(format!(
                "rate_eur must be a positive number, got {}",
                c.rate_eur
            )));
        }
        if c.db_url.is_empty() {
            return Err(EtlError::InvalidConfig("db_url must not be empty".into()));
        }
        Ok(self.config)
    }
}
