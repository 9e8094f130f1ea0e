//! Container image materializer.
//!
//! Builds and tags images through the container engine CLI and reads back
//! size and id via `image inspect`. Emulation for foreign platforms is left
//! to the engine; the platform string is only passed through.

use crate::error::{IoContext, PackagingError, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::progress::{PackagingEvent, ProgressReporter};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Dockerfile as a file inside (or outside) the context, or generated text.
#[derive(Debug, Clone)]
pub enum DockerfileSource {
    Path(PathBuf),
    Content(String),
}

#[derive(Debug, Clone)]
pub struct ImageBuildRequest {
    pub build_context: PathBuf,
    pub dockerfile: DockerfileSource,
    pub image_tag: String,
    pub build_args: BTreeMap<String, String>,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuildOutput {
    pub image_tag: String,
    pub image_id: String,
    pub size: u64,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageInspection {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

pub struct ImageMaterializer {
    engine: String,
    runner: Arc<dyn CommandRunner>,
    /// Where generated Dockerfiles are written; scoped to one invocation
    scratch_dir: PathBuf,
}

impl ImageMaterializer {
    pub fn new(engine: impl Into<String>, runner: Arc<dyn CommandRunner>, scratch_dir: &Path) -> Self {
        Self {
            engine: engine.into(),
            runner,
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }

    /// `docker build` arguments for a request whose Dockerfile is at `dockerfile_path`.
    pub fn build_command(&self, request: &ImageBuildRequest, dockerfile_path: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.engine, &self.engine)
            .arg("build")
            .args(["-t", request.image_tag.as_str()])
            .arg("-f")
            .arg(dockerfile_path.to_string_lossy())
            .env("DOCKER_BUILDKIT", "1");
        for (name, value) in &request.build_args {
            spec = spec.args(["--build-arg".to_string(), format!("{}={}", name, value)]);
        }
        if let Some(platform) = &request.platform {
            spec = spec.args(["--platform", platform.as_str()]);
        }
        spec.arg(request.build_context.to_string_lossy())
    }

    pub async fn build_image(
        &self,
        request: &ImageBuildRequest,
        workload: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<ImageBuildOutput> {
        if !request.build_context.is_dir() {
            return Err(PackagingError::SourceNotFound {
                path: request.build_context.clone(),
            });
        }

        // A generated Dockerfile lives exactly as long as this guard, on every exit path.
        let generated;
        let dockerfile_path = match &request.dockerfile {
            DockerfileSource::Path(path) => {
                if !path.is_file() {
                    return Err(PackagingError::SourceNotFound { path: path.clone() });
                }
                path.clone()
            }
            DockerfileSource::Content(content) => {
                generated = write_scratch_file(&self.scratch_dir, "Dockerfile-", content)?;
                generated.to_path_buf()
            }
        };

        let spec = self.build_command(request, &dockerfile_path);
        reporter.on_event(PackagingEvent::ToolStarted {
            workload: workload.to_string(),
            command: spec.to_string(),
        });

        let started = Instant::now();
        self.runner.run(&spec, workload, reporter).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let inspection = self.inspect(&request.image_tag, workload, reporter).await?;
        Ok(ImageBuildOutput {
            image_tag: request.image_tag.clone(),
            image_id: inspection.id,
            size: inspection.size,
            duration_ms,
            created_at: Utc::now(),
        })
    }

    /// Read size and id of an image already present in the engine.
    pub async fn inspect(
        &self,
        image_tag: &str,
        workload: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<ImageInspection> {
        let spec = CommandSpec::new(&self.engine, &self.engine)
            .args(["image", "inspect", "--format", "{{json .}}", image_tag])
            .capture_stdout();
        let output = self.runner.run(&spec, workload, reporter).await?;
        parse_inspection(&output.stdout)
    }
}

pub fn parse_inspection(stdout: &str) -> Result<ImageInspection> {
    let trimmed = stdout.trim();
    // Without `--format`, the engine prints a JSON array
    if trimmed.starts_with('[') {
        let mut all: Vec<ImageInspection> = serde_json::from_str(trimmed)?;
        return all.pop().ok_or_else(|| PackagingError::MissingBuildOutput {
            path: PathBuf::from("image inspect"),
        });
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Write a scratch file that is removed when the returned guard drops.
pub(crate) fn write_scratch_file(
    dir: &Path,
    prefix: &str,
    content: &str,
) -> Result<tempfile::TempPath> {
    std::fs::create_dir_all(dir).at(dir)?;
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(dir)
        .at(dir)?;
    file.write_all(content.as_bytes()).at(file.path())?;
    file.flush().at(file.path())?;
    Ok(file.into_temp_path())
}
