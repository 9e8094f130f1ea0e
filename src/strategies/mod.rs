//! Build strategy implementations, one module per packaging kind.
//!
//! Strategies whose inputs are known up front expose a digest step and a
//! build step so the dispatcher can run the skip check in between. The
//! bundler-backed strategies run their own skip check.

pub mod custom_artifact;
pub mod custom_dockerfile;
pub mod external_buildpack;
pub mod image_buildpack;
pub mod language_native;
pub mod nextjs;
pub mod nixpacks;

use crate::bundler::{join_error, LanguageBundler};
use crate::config::EngineConfig;
use crate::error::{IoContext, Result};
use crate::digest::Digest;
use crate::hasher::{self, ExcludeRules, FileFingerprint};
use crate::image::{ImageBuildOutput, ImageMaterializer};
use crate::process::CommandRunner;
use crate::progress::{PackagingEvent, ProgressReporter};
use crate::result::{Artifact, BuildResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a strategy needs for one packaging invocation.
pub struct StrategyContext<'a> {
    pub config: &'a EngineConfig,
    pub runner: Arc<dyn CommandRunner>,
    pub bundler: &'a dyn LanguageBundler,
    pub reporter: &'a dyn ProgressReporter,
    pub exclude: ExcludeRules,
    /// Unique per invocation; removed when the invocation ends
    pub scratch_dir: &'a Path,
    /// `<output_dir>/<workload name>`
    pub output_dir: PathBuf,
}

impl StrategyContext<'_> {
    pub fn images(&self) -> ImageMaterializer {
        ImageMaterializer::new(
            &self.config.container_engine,
            Arc::clone(&self.runner),
            self.scratch_dir,
        )
    }
}

/// Absolute form of a caller-supplied path, relative to the working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).at(path)
}

/// Walk and fingerprint off the async executor.
pub async fn fingerprint_tree(root: &Path, exclude: &ExcludeRules) -> Result<Vec<FileFingerprint>> {
    let owned_root = root.to_path_buf();
    let exclude = exclude.clone();
    tokio::task::spawn_blocking(move || hasher::collect_fingerprints(&owned_root, &exclude))
        .await
        .map_err(|e| join_error(root, e))?
}

/// Directory checksum, computed off the async executor.
pub async fn tree_checksum(root: &Path, exclude: &ExcludeRules) -> Result<String> {
    let fingerprints = fingerprint_tree(root, exclude).await?;
    Ok(hasher::checksum(&fingerprints))
}

/// Build result for a freshly built image.
pub(crate) fn image_result(
    ctx: &StrategyContext<'_>,
    name: &str,
    digest: Digest,
    output: ImageBuildOutput,
) -> BuildResult {
    crate::log_artifact_ready!(name, output.image_tag, output.size);
    ctx.reporter.on_event(PackagingEvent::ArtifactReady {
        workload: name.to_string(),
        location: output.image_tag.clone(),
        size_bytes: output.size,
    });
    BuildResult::bundled(
        name,
        digest,
        output.size,
        Artifact::Image {
            tag: output.image_tag,
            image_id: output.image_id,
            duration_ms: output.duration_ms,
            created_at: output.created_at,
        },
    )
}
