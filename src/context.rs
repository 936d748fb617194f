//! Context gatherer: shared source context for every request of a batch.

use crate::error::ProcessError;
use std::fs;
use std::path::{Path, PathBuf};

/// Source files with `extension` directly inside `folder`, sorted by name.
///
/// Subfolders are not visited.
pub fn list_source_files(folder: &Path, extension: &str) -> Result<Vec<PathBuf>, ProcessError> {
    let entries = fs::read_dir(folder).map_err(|source| ProcessError::ContextRead {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ProcessError::ContextRead {
            path: folder.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    // Sort for deterministic output
    files.sort();
    Ok(files)
}

/// Concatenate every source file in `folder`, one blank line between files.
///
/// Any unreadable file fails the whole gather; there is no partial context.
pub fn gather_context(folder: &Path, extension: &str) -> Result<String, ProcessError> {
    let mut parts = Vec::new();
    for path in list_source_files(folder, extension)? {
        let content = fs::read_to_string(&path)
            .map_err(|source| ProcessError::ContextRead { path, source })?;
        parts.push(content.trim_end_matches('\n').to_string());
    }
    Ok(parts.join("\n\n"))
}
