//! PDF text extraction.
//!
//! Delegates entirely to the `pdf-extract` crate, which concatenates the
//! embedded text of every page. Extraction is synchronous CPU-bound work, so
//! it runs under `spawn_blocking` to keep it off the async executor's hot
//! path. Scanned (image-only) invoices produce empty or garbled text here;
//! the structuring model then answers with the failure token and the file is
//! skipped — OCR is out of scope.

use crate::error::FileError;
use std::path::Path;
use tracing::debug;

/// Extract the concatenated page text of one PDF.
///
/// # Errors
/// [`FileError::ExtractFailed`] on any extraction failure (corrupt file,
/// unsupported encoding). Non-fatal: the caller skips the file.
pub async fn extract_text(path: &Path) -> Result<String, FileError> {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
        .await
        .map_err(|join_err| FileError::ExtractFailed {
            path: path.to_path_buf(),
            detail: format!("extraction task panicked: {join_err}"),
        })?;

    match result {
        Ok(text) => {
            debug!("Extracted {} chars from {}", text.len(), path.display());
            Ok(text)
        }
        Err(e) => Err(FileError::ExtractFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}
