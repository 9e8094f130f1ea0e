use crate::archive::{ArchiveEntry, PendingEntry};
use crate::constants::ARCHIVE_MTIME;
use crate::error::{IoContext, PackagingError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};
use tar::{Archive, Builder, Header};

pub(crate) fn write_tar_gz(file: File, entries: &[PendingEntry]) -> Result<()> {
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = Builder::new(encoder);

    for entry in entries {
        let source = File::open(&entry.absolute).at(&entry.absolute)?;
        let size = source.metadata().at(&entry.absolute)?.len();

        // Normalize metadata so identical inputs give identical bytes
        let mut header = Header::new_gnu();
        header.set_size(size);
        header.set_mode(entry.mode);
        header.set_mtime(ARCHIVE_MTIME);
        header.set_uid(0);
        header.set_gid(0);
        header.set_cksum();

        tar.append_data(&mut header, &entry.relative, source)
            .at(&entry.absolute)?;
    }

    let encoder = tar.into_inner().map_err(|e| PackagingError::io("tar", e))?;
    encoder.finish().map_err(|e| PackagingError::io("gzip", e))?;
    Ok(())
}

pub(crate) fn read_tar_gz(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path).at(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut entries = Vec::new();

    for entry in archive.entries().at(path)? {
        let mut entry = entry.at(path)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path().at(path)?.to_string_lossy().replace('\\', "/");
        let mode = entry.header().mode().at(path)?;
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).at(path)?;
        entries.push(ArchiveEntry {
            path: name,
            executable: mode & 0o111 != 0,
            contents,
        });
    }
    Ok(entries)
}

/// Unpack into `dest_dir` and return the distinct top-level entry names.
pub(crate) fn unpack_tar_gz(path: &Path, dest_dir: &Path) -> Result<Vec<String>> {
    let file = File::open(path).at(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    let mut top_level = BTreeSet::new();

    for entry in archive.entries().at(path)? {
        let mut entry = entry.at(path)?;
        let entry_path = entry.path().at(path)?.to_path_buf();
        if let Some(Component::Normal(first)) = entry_path.components().next() {
            top_level.insert(first.to_string_lossy().to_string());
        }
        // `unpack_in` refuses entries escaping `dest_dir`
        entry.unpack_in(dest_dir).at(dest_dir)?;
    }
    Ok(top_level.into_iter().collect())
}
