//! Archive materializer: zip and tar.gz artifacts from a directory or a single file.
//!
//! Output is written to a temporary sibling file and renamed into place only
//! after the archive is complete; on any error the partial file is removed.

pub mod targz;
pub mod zipfile;

use crate::error::{IoContext, PackagingError, Result};
use crate::hasher::{walk_dir, ExcludeRules, WalkedFile};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") || name.ends_with(".jar") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Globs (relative path or file name) stored with mode 0755
    pub executable_patterns: Vec<String>,
    /// Archive file name without extension; defaults to the source basename
    pub file_name: Option<String>,
    pub exclude: ExcludeRules,
}

/// Produced archive plus the relative paths it contains.
#[derive(Debug, Clone)]
pub struct ArchiveOutput {
    pub path: PathBuf,
    /// Compressed size on disk
    pub size: u64,
    pub files: Vec<String>,
}

/// One entry to be written, with its final mode already decided.
pub(crate) struct PendingEntry {
    pub relative: String,
    pub absolute: PathBuf,
    pub mode: u32,
}

/// Archive `source` (directory or single file) into `dest_dir`.
pub fn archive(
    source: &Path,
    dest_dir: &Path,
    format: ArchiveFormat,
    options: &ArchiveOptions,
) -> Result<ArchiveOutput> {
    let files = walk_dir(source, &options.exclude)?;
    let executables = compile_patterns(&options.executable_patterns);
    let entries: Vec<PendingEntry> = files
        .iter()
        .map(|f| PendingEntry {
            relative: f.relative.clone(),
            absolute: f.absolute.clone(),
            mode: entry_mode(f, &executables),
        })
        .collect();

    fs::create_dir_all(dest_dir).at(dest_dir)?;
    let base_name = match &options.file_name {
        Some(name) => name.clone(),
        None => default_base_name(source),
    };
    let final_path = dest_dir.join(format!("{}.{}", base_name, format.extension()));

    let temp = tempfile::Builder::new()
        .prefix(".packsmith-")
        .suffix(".partial")
        .tempfile_in(dest_dir)
        .at(dest_dir)?;
    let (file, temp_path) = temp.into_parts();

    // `temp_path` deletes the partial file when dropped on an error path.
    match format {
        ArchiveFormat::Zip => zipfile::write_zip(file, &entries)?,
        ArchiveFormat::TarGz => targz::write_tar_gz(file, &entries)?,
    }

    temp_path
        .persist(&final_path)
        .map_err(|e| PackagingError::io(&final_path, e.error))?;

    let size = fs::metadata(&final_path).at(&final_path)?.len();
    tracing::debug!(
        path = %final_path.display(),
        entries = entries.len(),
        size_bytes = size,
        "Archive written"
    );

    Ok(ArchiveOutput {
        path: final_path,
        size,
        files: entries.into_iter().map(|e| e.relative).collect(),
    })
}

/// An archive entry loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub executable: bool,
    pub contents: Vec<u8>,
}

/// Load every file entry of a zip or tar.gz archive, sorted by path.
pub fn read_archive(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = match ArchiveFormat::from_path(path) {
        Some(ArchiveFormat::Zip) => zipfile::read_zip(path)?,
        Some(ArchiveFormat::TarGz) => targz::read_tar_gz(path)?,
        None => {
            return Err(PackagingError::InvalidWorkload {
                workload: path.display().to_string(),
                reason: "not a .zip or .tar.gz archive".to_string(),
            })
        }
    };
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Extract a tar.gz into `dest_dir`. A lone top-level `package/` directory
/// (the npm tarball convention) is renamed after the archive, e.g.
/// `lib-1.0.0.tgz` extracts to `<dest_dir>/lib-1.0.0`.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir).at(dest_dir)?;
    let top_level = targz::unpack_tar_gz(archive_path, dest_dir)?;

    if top_level.len() == 1 && top_level[0] == "package" {
        let package_dir = dest_dir.join("package");
        if package_dir.is_dir() {
            let expected = dest_dir.join(archive_stem(archive_path));
            if expected.exists() {
                fs::remove_dir_all(&expected).at(&expected)?;
            }
            fs::rename(&package_dir, &expected).at(&package_dir)?;
            return Ok(expected);
        }
    }
    Ok(dest_dir.to_path_buf())
}

fn archive_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    for ext in [".tar.gz", ".tgz", ".zip"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    name
}

fn default_base_name(source: &Path) -> String {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    if source.is_file() {
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name,
        }
    } else {
        name
    }
}

fn compile_patterns(globs: &[String]) -> Vec<Pattern> {
    globs.iter().filter_map(|g| Pattern::new(g).ok()).collect()
}

fn entry_mode(file: &WalkedFile, executables: &[Pattern]) -> u32 {
    let file_name = file.relative.rsplit('/').next().unwrap_or(&file.relative);
    let matches_pattern = executables
        .iter()
        .any(|p| p.matches(&file.relative) || p.matches(file_name));
    if matches_pattern || host_executable(&file.absolute) {
        0o755
    } else {
        0o644
    }
}

#[cfg(unix)]
fn host_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn host_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("index.js"), "exports.handler = () => 1").unwrap();
        fs::write(dir.path().join("bin").join("tool"), "#!/bin/sh\necho hi").unwrap();
        dir
    }

    #[test]
    fn test_zip_roundtrip_with_executables() {
        let src = project();
        let out = tempdir().unwrap();
        let options = ArchiveOptions {
            executable_patterns: vec!["bin/*".to_string()],
            ..Default::default()
        };
        let result = archive(src.path(), out.path(), ArchiveFormat::Zip, &options).unwrap();
        let entries = read_archive(&result.path).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["bin/tool", "index.js"]);
        assert!(entries[0].executable);
        assert!(!entries[1].executable);
        assert_eq!(result.files, vec!["bin/tool", "index.js"]);
    }

    #[test]
    fn test_tar_gz_roundtrip_with_executables() {
        let src = project();
        let out = tempdir().unwrap();
        let options = ArchiveOptions {
            executable_patterns: vec!["tool".to_string()],
            file_name: Some("bundle".to_string()),
            ..Default::default()
        };
        let result = archive(src.path(), out.path(), ArchiveFormat::TarGz, &options).unwrap();
        assert_eq!(result.path, out.path().join("bundle.tar.gz"));
        let entries = read_archive(&result.path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.path == "bin/tool" && e.executable));
        assert_eq!(entries[1].contents, b"exports.handler = () => 1");
    }

    #[test]
    fn test_single_file_archive_has_one_entry() {
        let src = project();
        let out = tempdir().unwrap();
        let result = archive(
            &src.path().join("index.js"),
            out.path(),
            ArchiveFormat::Zip,
            &ArchiveOptions::default(),
        )
        .unwrap();
        assert_eq!(result.path, out.path().join("index.zip"));
        let entries = read_archive(&result.path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "index.js");
    }

    #[test]
    fn test_missing_source_leaves_no_file() {
        let out = tempdir().unwrap();
        let err = archive(
            &out.path().join("nope"),
            out.path(),
            ArchiveFormat::Zip,
            &ArchiveOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PackagingError::SourceNotFound { .. }));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_archives_are_deterministic() {
        let src = project();
        let out_a = tempdir().unwrap();
        let out_b = tempdir().unwrap();
        let a = archive(src.path(), out_a.path(), ArchiveFormat::TarGz, &ArchiveOptions::default()).unwrap();
        let b = archive(src.path(), out_b.path(), ArchiveFormat::TarGz, &ArchiveOptions::default()).unwrap();
        assert_eq!(fs::read(a.path).unwrap(), fs::read(b.path).unwrap());
    }

    #[test]
    fn test_extract_renames_package_dir() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("package")).unwrap();
        fs::write(src.path().join("package").join("index.js"), "1").unwrap();
        let out = tempdir().unwrap();
        let packed = archive(
            src.path(),
            out.path(),
            ArchiveFormat::TarGz,
            &ArchiveOptions {
                file_name: Some("lib-1.0.0".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let dest = tempdir().unwrap();
        let extracted = extract_archive(&packed.path, dest.path()).unwrap();
        assert_eq!(extracted, dest.path().join("lib-1.0.0"));
        assert!(extracted.join("index.js").is_file());
    }
}
