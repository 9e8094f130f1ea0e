//! Language bundle zipped for a function runtime.

use super::custom_artifact::{self, Prepared, SourceKind};
use super::{absolute, StrategyContext};
use crate::bundler::{BundleOutput, BundleRequest, Language};
use crate::error::{IoContext, PackagingError, Result};
use crate::hasher::{walk_dir, ExcludeRules};
use crate::progress::PackagingEvent;
use crate::result::{BuildResult, Outcome};
use crate::workload::{LanguageNativeBuildpack, Workload};
use std::path::Path;

pub async fn package(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &LanguageNativeBuildpack,
) -> Result<BuildResult> {
    let source_dir = absolute(&spec.source_directory_path)?;
    let request = BundleRequest {
        workload,
        source_dir: &source_dir,
        build_dir: ctx.scratch_dir,
        exclude: &ctx.exclude,
        strategy_inputs: serde_json::json!({
            "kind": "zip",
            "executablePatterns": spec.executable_patterns,
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
    let uncompressed_size = bundle_size(&dist_dir)?;

    let prepared = Prepared {
        name: workload.name.clone(),
        source: dist_dir,
        kind: SourceKind::Directory,
        digest: bundle.digest.clone(),
        uncompressed_size,
        handler: function_handler(&bundle),
        executable_patterns: spec.executable_patterns.clone(),
    };
    custom_artifact::build(ctx, prepared).await
}

/// Handler string in the form function runtimes expect.
/// Interpreted languages use `<module>.<function>`, defaulting to `handler`.
/// Python modules are dotted, Node.js resolves the file path (`src/index.handler`).
pub fn function_handler(bundle: &BundleOutput) -> Option<String> {
    let module = match bundle.language {
        Language::Python => bundle.entry.module_path(),
        Language::Javascript => bundle.entry.path_without_extension().replace('\\', "/"),
        Language::Java | Language::Go => return bundle.entry.handler.clone(),
    };
    let function = bundle.entry.handler.as_deref().unwrap_or("handler");
    Some(format!("{module}.{function}"))
}

fn bundle_size(dist_dir: &Path) -> Result<u64> {
    let mut total = 0;
    for file in walk_dir(dist_dir, &ExcludeRules::empty())? {
        total += std::fs::metadata(&file.absolute).at(&file.absolute)?.len();
    }
    Ok(total)
}
