//! Structural checksums of source trees.
//!
//! Collecting fingerprints touches the filesystem; [`checksum`] is a pure
//! function over the collected list, so it can be tested against fixtures.

pub mod ignore;
pub mod walker;

pub use ignore::ExcludeRules;
pub use walker::{walk_dir, WalkedFile};

use crate::error::{IoContext, Result};
use rayon::prelude::*;
use std::io::Read;
use std::path::Path;

/// Content identity of one file: relative path + content hash. Timestamps are not recorded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileFingerprint {
    pub relative: String,
    pub content_hash: String,
    pub size: u64,
}

impl FileFingerprint {
    pub fn from_bytes(relative: impl Into<String>, data: &[u8]) -> Self {
        Self {
            relative: relative.into(),
            content_hash: blake3::hash(data).to_hex().to_string(),
            size: data.len() as u64,
        }
    }
}

/// Hash the contents of every walked file, in parallel.
pub fn fingerprint_files(files: &[WalkedFile]) -> Result<Vec<FileFingerprint>> {
    files
        .par_iter()
        .map(|file| {
            let mut hasher = blake3::Hasher::new();
            let mut reader = std::fs::File::open(&file.absolute).at(&file.absolute)?;
            let mut buf = [0u8; 64 * 1024];
            let mut size = 0u64;
            loop {
                let n = reader.read(&mut buf).at(&file.absolute)?;
                if n == 0 {
                    break;
                }
                size += n as u64;
                hasher.update(&buf[..n]);
            }
            Ok(FileFingerprint {
                relative: file.relative.clone(),
                content_hash: hasher.finalize().to_hex().to_string(),
                size,
            })
        })
        .collect()
}

/// Walk + fingerprint a directory (or a single file).
pub fn collect_fingerprints(root: &Path, exclude: &ExcludeRules) -> Result<Vec<FileFingerprint>> {
    let files = walk_dir(root, exclude)?;
    fingerprint_files(&files)
}

/// Order-independent checksum of a fingerprint list. An empty list is valid.
pub fn checksum(fingerprints: &[FileFingerprint]) -> String {
    let mut sorted: Vec<&FileFingerprint> = fingerprints.iter().collect();
    sorted.sort();

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"packsmith-tree-v1\n");
    for fp in sorted {
        // Length-prefix the path so `a` + `bc` never collides with `ab` + `c`
        hasher.update(&(fp.relative.len() as u64).to_le_bytes());
        hasher.update(fp.relative.as_bytes());
        hasher.update(fp.content_hash.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Checksum of a directory tree or a single file.
pub fn directory_checksum(root: &Path, exclude: &ExcludeRules) -> Result<String> {
    Ok(checksum(&collect_fingerprints(root, exclude)?))
}

/// Total uncompressed size of a fingerprint list.
pub fn total_size(fingerprints: &[FileFingerprint]) -> u64 {
    fingerprints.iter().map(|f| f.size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fixture() -> Vec<FileFingerprint> {
        vec![
            FileFingerprint::from_bytes("src/main.py", b"print('hi')"),
            FileFingerprint::from_bytes("requirements.txt", b"requests==2.31.0"),
        ]
    }

    #[test]
    fn test_checksum_is_order_independent() {
        let mut reversed = fixture();
        reversed.reverse();
        assert_eq!(checksum(&fixture()), checksum(&reversed));
    }

    #[test]
    fn test_checksum_sensitive_to_path() {
        let mut renamed = fixture();
        renamed[0].relative = "src/app.py".to_string();
        assert_ne!(checksum(&fixture()), checksum(&renamed));
    }

    #[test]
    fn test_checksum_sensitive_to_content() {
        let mut changed = fixture();
        changed[1] = FileFingerprint::from_bytes("requirements.txt", b"requests==2.32.0");
        assert_ne!(checksum(&fixture()), checksum(&changed));
    }

    #[test]
    fn test_empty_checksum_is_stable() {
        assert_eq!(checksum(&[]), checksum(&[]));
        assert_eq!(checksum(&[]).len(), 64);
    }

    #[test]
    fn test_directory_checksum_ignores_mtime() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "same").unwrap();
        let first = directory_checksum(dir.path(), &ExcludeRules::empty()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&file, "same").unwrap();
        let second = directory_checksum(dir.path(), &ExcludeRules::empty()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_directory_checksum_respects_excludes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let before = directory_checksum(dir.path(), &ExcludeRules::defaults()).unwrap();
        fs::create_dir(dir.path().join("coverage")).unwrap();
        fs::write(dir.path().join("coverage").join("lcov.info"), "x").unwrap();
        let after = directory_checksum(dir.path(), &ExcludeRules::defaults()).unwrap();
        assert_eq!(before, after);
    }
}
