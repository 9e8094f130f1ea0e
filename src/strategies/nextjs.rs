//! Next.js through the open-next adapter.
//!
//! One framework build fans out into several function artifacts plus a
//! directory of static assets. Each function is packaged as a custom
//! artifact with its own digest, so unchanged functions are skipped even
//! when a sibling changed.

use super::custom_artifact;
use super::{absolute, StrategyContext};
use crate::bundler::copy_walked;
use crate::constants::EDGE_ENV_PLACEHOLDER;
use crate::error::{IoContext, PackagingError, Result};
use crate::hasher::{walk_dir, ExcludeRules};
use crate::process::CommandSpec;
use crate::progress::PackagingEvent;
use crate::result::BuildResult;
use crate::workload::{CustomArtifact, MetaFrameworkWeb, Workload};
use std::fs;
use std::path::{Path, PathBuf};

pub const OPEN_NEXT_DIR: &str = ".open-next";
pub const BUCKET_CONTENT_DIR: &str = "bucket-content";
pub const EDGE_WRAPPER_FILE: &str = "edge-index.mjs";

/// A function the framework output splits into, in result order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedFunction {
    Server,
    ImageOptimization,
    Revalidation,
    RevalidationInsert,
    ServerEdge,
}

impl NestedFunction {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Server => "server-function",
            Self::ImageOptimization => "image-function",
            Self::Revalidation => "revalidation-function",
            Self::RevalidationInsert => "revalidation-insert-function",
            Self::ServerEdge => "server-edge-function",
        }
    }

    pub fn handler(&self) -> &'static str {
        match self {
            Self::ServerEdge => "edge-index.handler",
            _ => "index.handler",
        }
    }

    /// Functions produced for a given edge setting.
    pub fn all(use_edge: bool) -> Vec<Self> {
        let mut functions = vec![
            Self::Server,
            Self::ImageOptimization,
            Self::Revalidation,
            Self::RevalidationInsert,
        ];
        if use_edge {
            functions.push(Self::ServerEdge);
        }
        functions
    }
}

/// `npx --yes open-next@VERSION build`, run inside the app directory.
pub fn build_command(
    npx_binary: &str,
    version: &str,
    app_dir: &Path,
    spec: &MetaFrameworkWeb,
) -> CommandSpec {
    let mut command = CommandSpec::new("open-next", npx_binary)
        .args(["--yes".to_string(), format!("open-next@{}", version), "build".to_string()])
        .current_dir(app_dir);
    for (key, value) in &spec.environment {
        command = command.env(key, value);
    }
    command
}

/// Source of the edge wrapper. The placeholder is replaced with a JSON object at deploy time.
pub fn edge_wrapper_source() -> String {
    format!(
        r#"const injectedEnvironment = {placeholder};
Object.assign(process.env, injectedEnvironment);

const server = await import("./index.mjs");

export const handler = async (event, context) => server.handler(event, context);
"#,
        placeholder = EDGE_ENV_PLACEHOLDER
    )
}

pub async fn package(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &MetaFrameworkWeb,
) -> Result<Vec<BuildResult>> {
    let app_dir = absolute(&spec.app_directory)?;
    if !app_dir.is_dir() {
        return Err(PackagingError::SourceNotFound { path: app_dir });
    }

    let command = build_command(
        &ctx.config.npx_binary,
        &ctx.config.open_next_version,
        &app_dir,
        spec,
    );
    ctx.reporter.on_event(PackagingEvent::ToolStarted {
        workload: workload.name.clone(),
        command: command.to_string(),
    });
    ctx.runner.run(&command, &workload.name, ctx.reporter).await?;

    let open_next = app_dir.join(OPEN_NEXT_DIR);
    if !open_next.is_dir() {
        return Err(PackagingError::MissingBuildOutput { path: open_next });
    }

    let bucket_content = ctx.output_dir.join(BUCKET_CONTENT_DIR);
    move_dir(&open_next.join("assets"), &bucket_content)?;
    tracing::info!(
        workload = %workload.name,
        path = %bucket_content.display(),
        "Static assets moved to bucket content"
    );

    // The server bundle ships its own `.next` directory, so nothing is excluded here.
    let function_ctx = StrategyContext {
        config: ctx.config,
        runner: std::sync::Arc::clone(&ctx.runner),
        bundler: ctx.bundler,
        reporter: ctx.reporter,
        exclude: ExcludeRules::empty(),
        scratch_dir: ctx.scratch_dir,
        output_dir: ctx.output_dir.clone(),
    };

    let mut results = Vec::new();
    for function in NestedFunction::all(spec.use_edge_lambda) {
        let package_path = match function {
            NestedFunction::ServerEdge => {
                let server = server_function_dir(&open_next)?;
                write_edge_function(&server, &ctx.scratch_dir.join(function.suffix()))?
            }
            other => function_dir(&open_next, other)?,
        };
        let artifact = CustomArtifact {
            package_path,
            handler: Some(function.handler().to_string()),
        };
        let name = format!("{}-{}", workload.name, function.suffix());
        let result = custom_artifact::package(
            &function_ctx,
            &name,
            &artifact,
            &workload.existing_digests,
            workload.additional_digest_input.as_deref(),
        )
        .await?;
        results.push(result);
    }
    Ok(results)
}

fn server_function_dir(open_next: &Path) -> Result<PathBuf> {
    // Newer adapter versions nest the default server under `server-functions/`
    let nested = open_next.join("server-functions").join("default");
    if nested.is_dir() {
        return Ok(nested);
    }
    let legacy = open_next.join("server-function");
    if legacy.is_dir() {
        return Ok(legacy);
    }
    Err(PackagingError::MissingBuildOutput { path: nested })
}

fn function_dir(open_next: &Path, function: NestedFunction) -> Result<PathBuf> {
    let dir = match function {
        NestedFunction::Server | NestedFunction::ServerEdge => return server_function_dir(open_next),
        NestedFunction::ImageOptimization => open_next.join("image-optimization-function"),
        NestedFunction::Revalidation => open_next.join("revalidation-function"),
        NestedFunction::RevalidationInsert => open_next.join("dynamodb-provider"),
    };
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(PackagingError::MissingBuildOutput { path: dir })
    }
}

/// Copy the server function next to a wrapper entry point.
fn write_edge_function(server_dir: &Path, dest: &Path) -> Result<PathBuf> {
    let files = walk_dir(server_dir, &ExcludeRules::empty())?;
    copy_walked(&files, dest)?;
    let wrapper = dest.join(EDGE_WRAPPER_FILE);
    fs::write(&wrapper, edge_wrapper_source()).at(&wrapper)?;
    Ok(dest.to_path_buf())
}

/// Rename, falling back to copy + delete across filesystems.
fn move_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        return Err(PackagingError::MissingBuildOutput {
            path: from.to_path_buf(),
        });
    }
    if to.exists() {
        fs::remove_dir_all(to).at(to)?;
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    let files = walk_dir(from, &ExcludeRules::empty())?;
    copy_walked(&files, to)?;
    fs::remove_dir_all(from).at(from)
}
