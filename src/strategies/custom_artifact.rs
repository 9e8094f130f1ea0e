//! Pre-built artifacts: a directory to zip, or an archive used as-is.

use super::{absolute, fingerprint_tree, StrategyContext};
use crate::archive::{self, zipfile, ArchiveFormat, ArchiveOptions};
use crate::digest::{should_skip, Digest, DigestBuilder};
use crate::error::{IoContext, PackagingError, Result};
use crate::hasher;
use crate::progress::PackagingEvent;
use crate::result::{Artifact, BuildResult};
use crate::workload::CustomArtifact;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Directory,
    /// An existing `.zip`/`.jar`, copied without re-archiving
    Prebuilt,
    /// Any other single file, zipped on its own
    SingleFile,
}

/// Digest plus what the build step needs, computed without side effects.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub name: String,
    pub source: PathBuf,
    pub kind: SourceKind,
    pub digest: Digest,
    pub uncompressed_size: u64,
    pub handler: Option<String>,
    pub executable_patterns: Vec<String>,
}

pub async fn prepare(
    ctx: &StrategyContext<'_>,
    name: &str,
    spec: &CustomArtifact,
    additional_digest_input: Option<&str>,
) -> Result<Prepared> {
    let source = absolute(&spec.package_path)?;
    if !source.exists() {
        return Err(PackagingError::SourceNotFound { path: source });
    }

    let kind = if source.is_dir() {
        SourceKind::Directory
    } else if ArchiveFormat::from_path(&source) == Some(ArchiveFormat::Zip) {
        SourceKind::Prebuilt
    } else {
        SourceKind::SingleFile
    };

    let fingerprints = fingerprint_tree(&source, &ctx.exclude).await?;
    let uncompressed_size = match kind {
        SourceKind::Prebuilt => zipfile::summarize(&source)?.uncompressed_size,
        _ => hasher::total_size(&fingerprints),
    };

    let digest = DigestBuilder::new()
        .sources(&fingerprints)
        .additional(additional_digest_input)
        .finish();

    Ok(Prepared {
        name: name.to_string(),
        source,
        kind,
        digest,
        uncompressed_size,
        handler: spec.handler.clone(),
        executable_patterns: Vec::new(),
    })
}

/// Produce the artifact. The size ceiling is checked before anything is written.
pub async fn build(ctx: &StrategyContext<'_>, prepared: Prepared) -> Result<BuildResult> {
    let limit = ctx.config.max_artifact_bytes;
    if prepared.uncompressed_size > limit {
        return Err(PackagingError::SizeLimitExceeded {
            workload: prepared.name.clone(),
            actual_bytes: prepared.uncompressed_size,
            limit_bytes: limit,
        });
    }

    let output_dir = ctx.output_dir.clone();
    let exclude = ctx.exclude.clone();
    let task = prepared.clone();
    let (path, size, files) = tokio::task::spawn_blocking(move || -> Result<_> {
        match task.kind {
            SourceKind::Prebuilt => copy_prebuilt(&task.source, &output_dir, &task.name),
            SourceKind::Directory | SourceKind::SingleFile => {
                let options = ArchiveOptions {
                    executable_patterns: task.executable_patterns.clone(),
                    file_name: Some(task.name.clone()),
                    exclude,
                };
                let out = archive::archive(&task.source, &output_dir, ArchiveFormat::Zip, &options)?;
                Ok((out.path, out.size, out.files))
            }
        }
    })
    .await
    .map_err(|e| crate::bundler::join_error(&prepared.source, e))??;

    crate::log_artifact_ready!(prepared.name, path.display(), size);
    ctx.reporter.on_event(PackagingEvent::ArtifactReady {
        workload: prepared.name.clone(),
        location: path.display().to_string(),
        size_bytes: size,
    });

    Ok(BuildResult::bundled(
        prepared.name,
        prepared.digest,
        size,
        Artifact::Archive {
            path,
            files,
            handler: prepared.handler,
        },
    ))
}

/// Prepare, skip check, build. Used where one workload fans out into several artifacts.
pub async fn package(
    ctx: &StrategyContext<'_>,
    name: &str,
    spec: &CustomArtifact,
    known: &std::collections::BTreeSet<Digest>,
    additional_digest_input: Option<&str>,
) -> Result<BuildResult> {
    let prepared = prepare(ctx, name, spec, additional_digest_input).await?;
    if should_skip(&prepared.digest, known) {
        crate::log_digest_hit!(name, prepared.digest);
        ctx.reporter.on_event(PackagingEvent::Skipped {
            workload: name.to_string(),
            digest: prepared.digest.clone(),
        });
        return Ok(BuildResult::skipped(name, prepared.digest));
    }
    crate::log_digest_miss!(name, prepared.digest);
    build(ctx, prepared).await
}

fn copy_prebuilt(source: &Path, output_dir: &Path, name: &str) -> Result<(PathBuf, u64, Vec<String>)> {
    let summary = zipfile::summarize(source)?;
    fs::create_dir_all(output_dir).at(output_dir)?;
    let target = output_dir.join(format!("{}.zip", name));
    if target != source {
        let temp = tempfile::Builder::new()
            .prefix(".packsmith-")
            .suffix(".partial")
            .tempfile_in(output_dir)
            .at(output_dir)?
            .into_temp_path();
        fs::copy(source, &temp).at(source)?;
        temp.persist(&target)
            .map_err(|e| PackagingError::io(&target, e.error))?;
    }
    let size = fs::metadata(&target).at(&target)?.len();
    Ok((target, size, summary.files))
}
