//! Per-language image buildpack: bundle, generate a Dockerfile, build the image.

use super::{absolute, image_result, StrategyContext};
use crate::bundler::BundleRequest;
use crate::dockerfile::{self, DockerfileParams};
use crate::error::{PackagingError, Result};
use crate::image::{DockerfileSource, ImageBuildRequest};
use crate::progress::PackagingEvent;
use crate::result::{BuildResult, Outcome};
use crate::workload::{ImageBuildpack, Workload};
use std::collections::BTreeMap;

pub async fn package(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &ImageBuildpack,
) -> Result<BuildResult> {
    let source_dir = absolute(&spec.source_directory_path)?;
    let request = BundleRequest {
        workload,
        source_dir: &source_dir,
        build_dir: ctx.scratch_dir,
        exclude: &ctx.exclude,
        strategy_inputs: serde_json::json!({
            "kind": "image",
            "requiresGlibcBinaries": workload.requires_glibc_binaries,
            "customBuildCommands": spec.custom_build_commands,
            "platform": workload.platform,
        }),
    };
    let bundle = ctx.bundler.bundle(&request).await?;
    ctx.reporter.on_event(PackagingEvent::DigestComputed {
        workload: workload.name.clone(),
        digest: bundle.digest.clone(),
    });

    if bundle.outcome == Outcome::Skipped {
        crate::log_digest_hit!(workload.name, bundle.digest);
        ctx.reporter.on_event(PackagingEvent::Skipped {
            workload: workload.name.clone(),
            digest: bundle.digest.clone(),
        });
        return Ok(BuildResult::skipped(&workload.name, bundle.digest));
    }
    crate::log_digest_miss!(workload.name, bundle.digest);

    let dist_dir = bundle
        .dist_dir
        .clone()
        .ok_or_else(|| PackagingError::MissingBuildOutput {
            path: ctx.scratch_dir.to_path_buf(),
        })?;

    let dockerfile = dockerfile::generate(&DockerfileParams {
        language: bundle.language,
        version: &bundle.language_version,
        resolved: &bundle.resolved,
        entry: &bundle.entry,
        requires_glibc: workload.requires_glibc_binaries,
        custom_build_commands: &spec.custom_build_commands,
    });
    tracing::debug!(
        workload = %workload.name,
        base_image = dockerfile.runtime_image().unwrap_or_default(),
        "Generated Dockerfile"
    );

    let image_request = ImageBuildRequest {
        build_context: dist_dir,
        dockerfile: DockerfileSource::Content(dockerfile.render()),
        image_tag: workload.image_tag_for(&bundle.digest),
        build_args: BTreeMap::new(),
        platform: workload.platform.clone(),
    };
    let output = ctx
        .images()
        .build_image(&image_request, &workload.name, ctx.reporter)
        .await?;
    Ok(image_result(ctx, &workload.name, bundle.digest, output))
}
