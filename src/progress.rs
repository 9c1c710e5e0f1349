//! Progress-callback trait for per-file pipeline events.
//!
//! Inject an `Arc<dyn RunProgress>` via
//! [`crate::config::PipelineConfigBuilder::progress`] to receive real-time
//! events as the pipeline works through the discovered invoices.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a terminal progress bar, a log file, or a channel
//! without the library knowing anything about how the host application
//! communicates. All methods have default no-op implementations so callers
//! only override what they care about.

/// Called by the pipeline as it processes each invoice file.
///
/// The pipeline is strictly sequential, so implementations will never see
/// concurrent calls, but the trait is still `Send + Sync` so callbacks can
/// be shared across the async runtime.
pub trait RunProgress: Send + Sync {
    /// Called once after discovery, before any file is processed.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file is extracted and structured.
    fn on_file_start(&self, index: usize, total: usize, path: &std::path::Path) {
        let _ = (index, total, path);
    }

    /// Called when a file produced records.
    fn on_file_done(&self, index: usize, total: usize, records: usize) {
        let _ = (index, total, records);
    }

    /// Called when a file was skipped with a non-fatal error.
    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after the batch is persisted (or the run gave up).
    fn on_run_complete(&self, processed: usize, skipped: usize) {
        let _ = (processed, skipped);
    }
}
