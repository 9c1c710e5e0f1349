//! Per-attempt LLM usage metering.
//!
//! Every structuring attempt — success or failure — appends one row to a
//! CSV file so token spend and failure rates can be inspected after the
//! fact. The file is created with a header row on first use and appended to
//! forever after; nothing in this crate ever reads it back.
//!
//! Metering is observability, not control flow: a failed metrics write is
//! logged at WARN by the caller and never fails a structuring call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// One metered structuring attempt.
#[derive(Debug, Clone, Serialize)]
pub struct UsageEntry {
    /// When the attempt finished, RFC 3339.
    pub timestamp: DateTime<Utc>,
    /// Model identifier actually called on this attempt.
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Whether the provider call returned a response.
    pub success: bool,
}

impl UsageEntry {
    /// Entry for a successful call with the provider-reported token counts.
    pub fn success(model: &str, prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            model: model.to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            success: true,
        }
    }

    /// Zero-token entry for a failed call.
    pub fn failure(model: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            model: model.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            success: false,
        }
    }
}

/// Append-only CSV usage log.
#[derive(Debug, Clone)]
pub struct UsageLog {
    path: PathBuf,
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new.
    pub fn record(&self, entry: &UsageEntry) -> Result<(), csv::Error> {
        let write_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(csv::Error::from)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;
        Ok(())
    }
}
