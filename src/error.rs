//! Error types for the pdf2ledger library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`EtlError`] — **Fatal**: the run cannot proceed at all (missing input
//!   folder, no PDFs found, database failure, no successful records).
//!   Returned as `Err(EtlError)` from [`crate::run::run`].
//!
//! * [`FileError`] — **Non-fatal**: a single invoice file failed (garbled
//!   PDF, structuring retries exhausted, malformed response) but every other
//!   file is fine. Logged at WARN by the pipeline, which skips the file and
//!   continues.
//!
//! The separation lets callers decide their own tolerance: a run with 20
//! invoices and one corrupted PDF still writes 19 files' worth of records.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2ledger library.
///
/// Per-file failures use [`FileError`] and never abort the run.
#[derive(Debug, Error)]
pub enum EtlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The invoice folder does not exist or is not a directory.
    #[error("Invoice folder not found: '{path}'\nCreate it and drop PDF invoices inside.")]
    InputDirNotFound { path: PathBuf },

    /// Could not list the invoice folder contents.
    #[error("Failed to read invoice folder '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The folder exists but contains no PDF files (flat or one level down).
    #[error("No PDF files found under '{path}'")]
    NoPdfsFound { path: PathBuf },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No LLM provider could be constructed (missing API key etc.).
    #[error("LLM provider is not configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Every discovered file failed; there is nothing to persist.
    #[error("No invoices were processed successfully ({files} files attempted)")]
    NoRecords { files: usize },

    // ── Persistence errors ────────────────────────────────────────────────
    /// SQLite connection or query failure.
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Could not write a demo invoice PDF.
    #[error("Failed to write demo invoice '{path}': {detail}")]
    DemoWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single invoice file.
///
/// The pipeline logs these and moves on to the next file. The run fails only
/// if *every* file ends up here (see [`EtlError::NoRecords`]).
#[derive(Debug, Error)]
pub enum FileError {
    /// PDF text extraction failed (corrupt file, unsupported encoding, …).
    #[error("Text extraction failed for '{path}': {detail}")]
    ExtractFailed { path: PathBuf, detail: String },

    /// The structuring call gave up after exhausting its retry budget.
    #[error(transparent)]
    Structuring(#[from] StructuringError),

    /// The model answered with the literal failure token instead of records.
    #[error("Model reported it could not structure the invoice text")]
    ModelReportedFailure,

    /// The response was not the expected semicolon-delimited table.
    #[error("Malformed structuring response: {detail}")]
    MalformedResponse { detail: String },
}

/// Failure of the retry-with-fallback structuring call.
///
/// The original tool signalled this with a sentinel `"error"` string and
/// string-comparison control flow; a typed error carries the attempt count
/// and the last transport failure instead.
#[derive(Debug, Error)]
pub enum StructuringError {
    /// All attempts failed; `detail` is the last provider error seen.
    #[error("Structuring call failed after {attempts} attempts: {detail}")]
    Exhausted { attempts: u32, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_records_display() {
        let e = EtlError::NoRecords { files: 3 };
        assert!(e.to_string().contains("3 files"), "got: {e}");
    }

    #[test]
    fn exhausted_display() {
        let e = StructuringError::Exhausted {
            attempts: 5,
            detail: "503 service unavailable".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("5 attempts"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn structuring_error_converts_to_file_error() {
        let e: FileError = StructuringError::Exhausted {
            attempts: 2,
            detail: "timeout".into(),
        }
        .into();
        assert!(matches!(e, FileError::Structuring(_)));
    }
}
