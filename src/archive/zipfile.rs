use crate::archive::{ArchiveEntry, PendingEntry};
use crate::error::{IoContext, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use zip::{write::FileOptions, CompressionMethod, DateTime, ZipArchive, ZipWriter};

pub(crate) fn write_zip(file: File, entries: &[PendingEntry]) -> Result<()> {
    let mut zip = ZipWriter::new(file);
    let base = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    for entry in entries {
        zip.start_file(entry.relative.as_str(), base.unix_permissions(entry.mode))?;
        let mut source = File::open(&entry.absolute).at(&entry.absolute)?;
        io::copy(&mut source, &mut zip).at(&entry.absolute)?;
    }

    zip.finish()?;
    Ok(())
}

pub(crate) fn read_zip(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path).at(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let executable = entry.unix_mode().map(|m| m & 0o111 != 0).unwrap_or(false);
        let name = entry.name().to_string();
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents).at(path)?;
        entries.push(ArchiveEntry {
            path: name,
            executable,
            contents,
        });
    }
    Ok(entries)
}

/// File entries of an existing zip and their total uncompressed size.
#[derive(Debug, Clone, Default)]
pub struct ZipSummary {
    pub files: Vec<String>,
    pub uncompressed_size: u64,
}

/// Read from the central directory only; entry data is never decompressed.
pub fn summarize(path: &Path) -> Result<ZipSummary> {
    let file = File::open(path).at(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut summary = ZipSummary::default();
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if entry.is_dir() {
            continue;
        }
        summary.uncompressed_size += entry.size();
        summary.files.push(entry.name().to_string());
    }
    summary.files.sort();
    Ok(summary)
}
