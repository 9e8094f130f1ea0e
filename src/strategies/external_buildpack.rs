//! Cloud-native buildpacks through the `pack` CLI.

use super::{absolute, image_result, tree_checksum, StrategyContext};
use crate::constants::BUILDPACK_JVM_ENV;
use crate::digest::{Digest, DigestBuilder};
use crate::error::{PackagingError, Result};
use crate::image::ImageBuildOutput;
use crate::process::CommandSpec;
use crate::progress::PackagingEvent;
use crate::result::BuildResult;
use crate::workload::{ExternalBuildpack, Workload};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Prepared {
    pub digest: Digest,
    pub source_dir: PathBuf,
}

pub async fn prepare(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &ExternalBuildpack,
) -> Result<Prepared> {
    let source_dir = absolute(&spec.source_directory_path)?;
    if !source_dir.is_dir() {
        return Err(PackagingError::SourceNotFound { path: source_dir });
    }
    let checksum = tree_checksum(&source_dir, &ctx.exclude).await?;
    let digest = DigestBuilder::new()
        .source_checksum(checksum)
        .config("builder", &spec.builder)?
        .config("buildpacks", &spec.buildpacks)?
        .config("platform", &workload.platform)?
        .additional(workload.additional_digest_input.as_deref())
        .finish();
    Ok(Prepared { digest, source_dir })
}

/// `pack build TAG --path SRC --builder B [--buildpack X]... --env JAVA_TOOL_OPTIONS=... [--platform P]`
pub fn pack_command(
    pack_binary: &str,
    default_builder: &str,
    spec: &ExternalBuildpack,
    source_dir: &Path,
    image_tag: &str,
    platform: Option<&str>,
) -> CommandSpec {
    let builder = spec.builder.as_deref().unwrap_or(default_builder);
    let mut command = CommandSpec::new("pack", pack_binary)
        .args(["build", image_tag])
        .arg("--path")
        .arg(source_dir.to_string_lossy())
        .args(["--builder", builder]);
    for buildpack in &spec.buildpacks {
        command = command.args(["--buildpack", buildpack.as_str()]);
    }
    command = command.args(["--env", BUILDPACK_JVM_ENV]);
    if let Some(platform) = platform {
        command = command.args(["--platform", platform]);
    }
    command
}

pub async fn build(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &ExternalBuildpack,
    prepared: Prepared,
) -> Result<BuildResult> {
    let image_tag = workload.image_tag_for(&prepared.digest);
    let command = pack_command(
        &ctx.config.pack_binary,
        &ctx.config.default_builder,
        spec,
        &prepared.source_dir,
        &image_tag,
        workload.platform.as_deref(),
    );
    ctx.reporter.on_event(PackagingEvent::ToolStarted {
        workload: workload.name.clone(),
        command: command.to_string(),
    });

    let started = Instant::now();
    ctx.runner.run(&command, &workload.name, ctx.reporter).await?;
    let duration_ms = started.elapsed().as_millis() as u64;

    // pack produces the image itself; only its size and id are read back
    let inspection = ctx
        .images()
        .inspect(&image_tag, &workload.name, ctx.reporter)
        .await?;
    let output = ImageBuildOutput {
        image_tag,
        image_id: inspection.id,
        size: inspection.size,
        duration_ms,
        created_at: Utc::now(),
    };
    Ok(image_result(ctx, &workload.name, prepared.digest, output))
}
