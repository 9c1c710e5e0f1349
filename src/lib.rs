//! # pdf2ledger
//!
//! Turn a folder of PDF invoices into rows in a SQLite ledger, using an LLM
//! to normalise free-form invoice text into a fixed record schema.
//!
//! ## Why this crate?
//!
//! Invoices arrive as PDFs with wildly different layouts. Template-based
//! extractors break on every new vendor. Instead this crate extracts the raw
//! text of each PDF and asks an LLM to emit one semicolon-delimited record
//! per invoice — date, vendor, concept, amount, currency — then converts
//! foreign-currency amounts into COP with fixed fallback rates and appends
//! the result to a single `facturas` table.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ./facturas/
//!  │
//!  ├─ 1. Discover   flat PDFs + one level of subfolders
//!  ├─ 2. Extract    embedded text via pdf-extract (blocking, spawn_blocking)
//!  ├─ 3. Structure  LLM call with retry / backoff / fallback model
//!  ├─ 4. Parse      semicolon CSV → InvoiceRecord rows
//!  ├─ 5. Normalize  USD / EUR amounts → COP at fixed rates
//!  └─ 6. Persist    sqlx → SQLite table `facturas` (replace or append)
//! ```
//!
//! Steps 2–4 run per file with error isolation: a file that fails to
//! extract, structure, or parse is logged and skipped, never fatal. The run
//! aborts only when the input folder is missing, no PDFs are found, or no
//! file produced a single record.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2ledger::{run, PipelineConfig, WriteMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = PipelineConfig::builder()
//!         .input_dir("./facturas")
//!         .write_mode(WriteMode::Append)
//!         .build()?;
//!     let output = run(&config).await?;
//!     println!("{} records written", output.records_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2ledger` binary (clap + anyhow + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2ledger = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod db;
pub mod demo;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, WriteMode};
pub use db::InvoiceStore;
pub use error::{EtlError, FileError, StructuringError};
pub use model::{Currency, FxRates, InvoiceBatch, InvoiceRecord};
pub use pipeline::structure::{GenerativeModel, ModelCallError, ModelResponse, Structurer};
pub use progress::RunProgress;
pub use run::{run, RunOutput, RunStats};
