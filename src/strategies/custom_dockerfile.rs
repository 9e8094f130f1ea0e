use super::{absolute, image_result, tree_checksum, StrategyContext};
use crate::digest::{hash_bytes, Digest, DigestBuilder};
use crate::error::{IoContext, PackagingError, Result};
use crate::image::{DockerfileSource, ImageBuildRequest};
use crate::result::BuildResult;
use crate::workload::{CustomDockerfile, Workload};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Prepared {
    pub digest: Digest,
    pub build_context: PathBuf,
    pub dockerfile: PathBuf,
}

/// Digest = context checksum + Dockerfile path and content + build args
/// (+ platform and additional input).
pub async fn prepare(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &CustomDockerfile,
) -> Result<Prepared> {
    let build_context = absolute(&spec.build_context_path)?;
    if !build_context.is_dir() {
        return Err(PackagingError::SourceNotFound { path: build_context });
    }
    let relative = spec
        .dockerfile_path
        .as_deref()
        .unwrap_or_else(|| Path::new("Dockerfile"));
    let dockerfile = build_context.join(relative);
    if !dockerfile.is_file() {
        return Err(PackagingError::SourceNotFound { path: dockerfile });
    }
    // May live outside the context, which the tree checksum does not cover
    let dockerfile_content = tokio::fs::read(&dockerfile).await.at(&dockerfile)?;

    let checksum = tree_checksum(&build_context, &ctx.exclude).await?;
    let digest = DigestBuilder::new()
        .source_checksum(checksum)
        .config("dockerfile", &relative.to_string_lossy())?
        .part("dockerfile_content", hash_bytes(&dockerfile_content))
        .config("build_args", &spec.build_args)?
        .config("platform", &workload.platform)?
        .additional(workload.additional_digest_input.as_deref())
        .finish();

    Ok(Prepared {
        digest,
        build_context,
        dockerfile,
    })
}

pub async fn build(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &CustomDockerfile,
    prepared: Prepared,
) -> Result<BuildResult> {
    let request = ImageBuildRequest {
        build_context: prepared.build_context,
        dockerfile: DockerfileSource::Path(prepared.dockerfile),
        image_tag: workload.image_tag_for(&prepared.digest),
        build_args: spec.build_args.clone(),
        platform: workload.platform.clone(),
    };
    let output = ctx
        .images()
        .build_image(&request, &workload.name, ctx.reporter)
        .await?;
    Ok(image_result(ctx, &workload.name, prepared.digest, output))
}
