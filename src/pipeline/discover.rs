//! File discovery: collect PDF paths from the invoice folder.
//!
//! Two layouts are supported, matching how people actually organise an
//! invoice folder: PDFs dropped directly into the root, and PDFs filed into
//! one level of subfolders (typically one folder per month or vendor).
//! Deeper nesting is deliberately not walked.
//!
//! Ordering: flat files come first, in directory-listing order; subfolders
//! are visited in sorted-name order (so `2024-01/` precedes `2024-02/`
//! regardless of filesystem whims), each contributing its files in listing
//! order.

use crate::error::EtlError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Case-insensitive `.pdf` extension check on a regular file.
fn is_pdf_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Collect every PDF under `root`: flat files plus one level of subfolders.
///
/// # Errors
/// [`EtlError::InputDirNotFound`] when `root` is missing or not a directory;
/// [`EtlError::InputDirUnreadable`] when listing fails. An empty result is
/// *not* an error here — the caller decides (the run treats it as fatal).
pub fn discover_invoices(root: &Path) -> Result<Vec<PathBuf>, EtlError> {
    if !root.is_dir() {
        return Err(EtlError::InputDirNotFound {
            path: root.to_path_buf(),
        });
    }

    let read_dir = |dir: &Path| -> Result<Vec<PathBuf>, EtlError> {
        let entries = std::fs::read_dir(dir).map_err(|source| EtlError::InputDirUnreadable {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect())
    };

    let top_level = read_dir(root)?;

    // Flat PDFs, in listing order.
    let mut found: Vec<PathBuf> = top_level
        .iter()
        .filter(|p| is_pdf_file(p))
        .cloned()
        .collect();

    // One level of subfolders, sorted by name.
    let mut subdirs: Vec<PathBuf> = top_level.into_iter().filter(|p| p.is_dir()).collect();
    subdirs.sort();

    for dir in subdirs {
        for path in read_dir(&dir)? {
            if is_pdf_file(&path) {
                found.push(path);
            }
        }
    }

    debug!("Discovered {} PDF files under {}", found.len(), root.display());
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::write(path, b"%PDF-1.4 stub").unwrap();
    }

    #[test]
    fn missing_root_is_fatal() {
        let err = discover_invoices(Path::new("/no/such/folder")).unwrap_err();
        assert!(matches!(err, EtlError::InputDirNotFound { .. }));
    }

    #[test]
    fn finds_flat_and_nested_pdfs_ignoring_everything_else() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        touch(&root.join("a.pdf"));
        touch(&root.join("b.PDF"));
        fs::write(root.join("notes.txt"), b"not an invoice").unwrap();

        fs::create_dir(root.join("2024-02")).unwrap();
        touch(&root.join("2024-02/feb.pdf"));
        fs::create_dir(root.join("2024-01")).unwrap();
        touch(&root.join("2024-01/jan.pdf"));
        fs::write(root.join("2024-01/readme.md"), b"x").unwrap();

        // Two levels down must be ignored.
        fs::create_dir(root.join("2024-01/deep")).unwrap();
        touch(&root.join("2024-01/deep/ignored.pdf"));

        let found = discover_invoices(root).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(found.len(), 4, "got: {names:?}");
        assert!(!names.contains(&"ignored.pdf".to_string()));
        assert!(!names.contains(&"notes.txt".to_string()));

        // Subfolders come after flat files, in sorted folder order.
        let jan = names.iter().position(|n| n == "jan.pdf").unwrap();
        let feb = names.iter().position(|n| n == "feb.pdf").unwrap();
        assert!(jan < feb, "2024-01 must be visited before 2024-02");
        assert!(names.iter().position(|n| n == "a.pdf").unwrap() < jan);
    }

    #[test]
    fn empty_folder_is_ok_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_invoices(dir.path()).unwrap().is_empty());
    }
}
