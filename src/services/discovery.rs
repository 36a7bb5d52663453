//! Input file discovery for batch jobs.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// List the files in `folder` with the given extension (case-insensitive).
///
/// Office lock files (`~$name.docx`) are skipped, as are non-UTF-8 names.
/// When `name_filter` is set, only names containing it are kept. The result
/// is sorted by file name so batches are planned deterministically.
pub fn list_files(
    folder: &Utf8Path,
    extension: &str,
    name_filter: Option<&str>,
) -> Result<Vec<Utf8PathBuf>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("Failed to read folder: {}", folder))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read entry in {}", folder))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(path) => {
                tracing::warn!("Skipping non UTF-8 file name: {}", path.display());
                continue;
            }
        };

        let Some(name) = path.file_name() else {
            continue;
        };
        if name.starts_with("~$") {
            tracing::debug!("Skipping Office lock file: {}", name);
            continue;
        }
        let matches_extension = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches_extension {
            continue;
        }
        if let Some(filter) = name_filter {
            if !name.contains(filter) {
                continue;
            }
        }

        files.push(path);
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
