//! Automatic detection builds through the `nixpacks` CLI.

use super::{absolute, image_result, tree_checksum, StrategyContext};
use crate::constants::NIXPACKS_CONFIG_FILE_NAME;
use crate::digest::{Digest, DigestBuilder};
use crate::error::{IoContext, PackagingError, Result};
use crate::image::ImageBuildOutput;
use crate::process::CommandSpec;
use crate::progress::PackagingEvent;
use crate::result::BuildResult;
use crate::workload::{AutomaticBuildpack, Workload};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// On-disk shape of the tool's JSON configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NixpacksConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_image: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub phases: BTreeMap<String, PhaseConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<StartConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmds: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartConfig {
    pub cmd: String,
}

impl NixpacksConfig {
    pub fn from_spec(spec: &AutomaticBuildpack) -> Self {
        Self {
            build_image: spec.build_image.clone(),
            phases: spec
                .phases
                .iter()
                .map(|phase| {
                    (
                        phase.name.clone(),
                        PhaseConfig {
                            cmds: phase.cmds.clone(),
                            depends_on: phase.depends_on.clone(),
                        },
                    )
                })
                .collect(),
            start: spec.start_cmd.clone().map(|cmd| StartConfig { cmd }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prepared {
    pub digest: Digest,
    pub source_dir: PathBuf,
}

pub async fn prepare(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &AutomaticBuildpack,
) -> Result<Prepared> {
    let source_dir = absolute(&spec.source_directory_path)?;
    if !source_dir.is_dir() {
        return Err(PackagingError::SourceNotFound { path: source_dir });
    }
    let checksum = tree_checksum(&source_dir, &ctx.exclude).await?;
    let digest = DigestBuilder::new()
        .source_checksum(checksum)
        .config("exclude", &ctx.exclude.globs())?
        .config("nixpacks", &NixpacksConfig::from_spec(spec))?
        .config("platform", &workload.platform)?
        .additional(workload.additional_digest_input.as_deref())
        .finish();
    Ok(Prepared { digest, source_dir })
}

/// `nixpacks build SRC --name TAG --config FILE [--platform P]`
pub fn nixpacks_command(
    binary: &str,
    source_dir: &Path,
    image_tag: &str,
    config_path: &Path,
    platform: Option<&str>,
) -> CommandSpec {
    let mut command = CommandSpec::new("nixpacks", binary)
        .arg("build")
        .arg(source_dir.to_string_lossy())
        .args(["--name", image_tag])
        .arg("--config")
        .arg(config_path.to_string_lossy());
    if let Some(platform) = platform {
        command = command.args(["--platform", platform]);
    }
    command
}

pub async fn build(
    ctx: &StrategyContext<'_>,
    workload: &Workload,
    spec: &AutomaticBuildpack,
    prepared: Prepared,
) -> Result<BuildResult> {
    let image_tag = workload.image_tag_for(&prepared.digest);

    // The directory and the config inside it are removed when `config_dir` drops.
    fs::create_dir_all(ctx.scratch_dir).at(ctx.scratch_dir)?;
    let config_dir = tempfile::Builder::new()
        .prefix("nixpacks-")
        .tempdir_in(ctx.scratch_dir)
        .at(ctx.scratch_dir)?;
    let config_path = config_dir.path().join(NIXPACKS_CONFIG_FILE_NAME);
    let config = serde_json::to_string_pretty(&NixpacksConfig::from_spec(spec))?;
    fs::write(&config_path, config).at(&config_path)?;

    let command = nixpacks_command(
        &ctx.config.nixpacks_binary,
        &prepared.source_dir,
        &image_tag,
        &config_path,
        workload.platform.as_deref(),
    );
    ctx.reporter.on_event(PackagingEvent::ToolStarted {
        workload: workload.name.clone(),
        command: command.to_string(),
    });

    let started = Instant::now();
    let outcome = ctx.runner.run(&command, &workload.name, ctx.reporter).await;
    drop(config_dir);
    outcome?;
    let duration_ms = started.elapsed().as_millis() as u64;

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
