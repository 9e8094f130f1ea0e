use crate::error::{PackagingError, Result};
use crate::hasher::ignore::ExcludeRules;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file found under a source root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WalkedFile {
    /// Forward-slash path relative to the root
    pub relative: String,
    pub absolute: PathBuf,
}

/// Walk a directory and return all non-excluded files, sorted by relative path.
/// A single file yields exactly one entry named after the file.
pub fn walk_dir(root: &Path, exclude: &ExcludeRules) -> Result<Vec<WalkedFile>> {
    let metadata = std::fs::metadata(root).map_err(|_| PackagingError::SourceNotFound {
        path: root.to_path_buf(),
    })?;

    if metadata.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(vec![WalkedFile {
            relative: name,
            absolute: root.to_path_buf(),
        }]);
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            rel.as_os_str().is_empty() || !exclude.is_excluded(rel)
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            PackagingError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(WalkedFile {
            relative: to_slash(rel),
            absolute: entry.path().to_path_buf(),
        });
    }

    // Explicit sort for OS-independent determinism
    files.sort();
    Ok(files)
}

pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
