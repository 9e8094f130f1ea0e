//! Strategy dispatcher.
//!
//! [`Packager::package`] is a total match over [`Packaging`]. Strategies
//! whose inputs are known up front are split into prepare/build, and the
//! skip check runs here in between; bundler-backed strategies and the
//! multi-artifact web strategy check digests themselves.

use crate::bundler::{LanguageBundler, SourceTreeBundler};
use crate::config::EngineConfig;
use crate::digest::{should_skip, Digest};
use crate::error::{IoContext, PackagingError, Result};
use crate::hasher::ExcludeRules;
use crate::logging::PackagingMetrics;
use crate::process::{CommandRunner, ProcessRunner};
use crate::progress::{PackagingEvent, ProgressReporter, TracingReporter};
use crate::result::{BuildResult, Outcome, Packaged};
use crate::strategies::{
    custom_artifact, custom_dockerfile, external_buildpack, image_buildpack, language_native,
    nextjs, nixpacks, StrategyContext,
};
use crate::workload::{Packaging, Workload};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub struct Packager {
    config: EngineConfig,
    runner: Arc<dyn CommandRunner>,
    bundler: Arc<dyn LanguageBundler>,
    reporter: Arc<dyn ProgressReporter>,
}

/// Outcome of one workload within [`Packager::package_all`].
#[derive(Debug)]
pub struct WorkloadReport {
    pub workload: String,
    pub result: Result<Packaged>,
    pub duration_ms: u64,
}

impl Packager {
    pub fn new(config: EngineConfig) -> Self {
        let runner = Arc::new(ProcessRunner::new(config.output_tail_lines));
        Self {
            config,
            runner,
            bundler: Arc::new(SourceTreeBundler),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_bundler(mut self, bundler: Arc<dyn LanguageBundler>) -> Self {
        self.bundler = bundler;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Package one workload. Errors are returned unchanged and never retried.
    pub async fn package(&self, workload: &Workload) -> Result<Packaged> {
        let invocation = Uuid::new_v4();
        let span = tracing::info_span!(
            "package",
            workload = %workload.name,
            kind = workload.packaging.kind_name(),
            invocation = %invocation
        );
        let started = Instant::now();
        let result = self.dispatch(workload, invocation).instrument(span).await;

        match &result {
            Ok(_) => self.reporter.on_event(PackagingEvent::Finished {
                workload: workload.name.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
            }),
            Err(e) => self.reporter.on_event(PackagingEvent::Failed {
                workload: workload.name.clone(),
                error: e.to_string(),
            }),
        }
        result
    }

    /// Package many workloads with at most `concurrency` in flight. One failure
    /// does not stop the others; reports come back in input order.
    pub async fn package_all(
        &self,
        workloads: &[Workload],
        concurrency: usize,
    ) -> (Vec<WorkloadReport>, PackagingMetrics) {
        let mut reports: Vec<(usize, WorkloadReport)> = stream::iter(workloads.iter().enumerate())
            .map(|(index, workload)| async move {
                let started = Instant::now();
                let result = self.package(workload).await;
                let report = WorkloadReport {
                    workload: workload.name.clone(),
                    result,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                (index, report)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        reports.sort_by_key(|(index, _)| *index);
        let reports: Vec<WorkloadReport> = reports.into_iter().map(|(_, r)| r).collect();

        let mut metrics = PackagingMetrics::new();
        for report in &reports {
            metrics.total_workloads += 1;
            metrics.total_duration_ms += report.duration_ms;
            match &report.result {
                Ok(packaged) => {
                    for result in packaged.results() {
                        match result.outcome {
                            Outcome::Bundled => metrics.bundled += 1,
                            Outcome::Skipped => metrics.skipped += 1,
                        }
                        metrics.total_artifact_bytes += result.size.unwrap_or(0);
                    }
                }
                Err(_) => metrics.failed += 1,
            }
        }

        tracing::info!(
            total = metrics.total_workloads,
            bundled = metrics.bundled,
            skipped = metrics.skipped,
            failed = metrics.failed,
            skip_rate = metrics.skip_rate(),
            "Packaging finished"
        );
        (reports, metrics)
    }

    async fn dispatch(&self, workload: &Workload, invocation: Uuid) -> Result<Packaged> {
        validate_name(&workload.name)?;
        self.reporter.on_event(PackagingEvent::Started {
            workload: workload.name.clone(),
            kind: workload.packaging.kind_name().to_string(),
        });

        // Scoped to this invocation; removed on every exit path when dropped.
        let work_dir = &self.config.work_dir;
        std::fs::create_dir_all(work_dir).at(work_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", workload.name, invocation.simple()))
            .tempdir_in(work_dir)
            .at(work_dir)?;

        let exclude = match &workload.packaging {
            // Pre-built output ships as-is apart from VCS metadata
            Packaging::CustomArtifact(_) => ExcludeRules::vcs(),
            _ => self.config.exclude_rules(),
        };
        let ctx = StrategyContext {
            config: &self.config,
            runner: Arc::clone(&self.runner),
            bundler: self.bundler.as_ref(),
            reporter: self.reporter.as_ref(),
            exclude,
            scratch_dir: scratch.path(),
            output_dir: self.config.output_dir.join(&workload.name),
        };

        let packaged = match &workload.packaging {
            Packaging::CustomArtifact(spec) => {
                let prepared = custom_artifact::prepare(
                    &ctx,
                    &workload.name,
                    spec,
                    workload.additional_digest_input.as_deref(),
                )
                .await?;
                match self.check_skip(workload, &prepared.digest) {
                    Some(skipped) => skipped,
                    None => custom_artifact::build(&ctx, prepared).await?,
                }
            }
            Packaging::CustomDockerfile(spec) => {
                let prepared = custom_dockerfile::prepare(&ctx, workload, spec).await?;
                match self.check_skip(workload, &prepared.digest) {
                    Some(skipped) => skipped,
                    None => custom_dockerfile::build(&ctx, workload, spec, prepared).await?,
                }
            }
            Packaging::ExternalBuildpack(spec) => {
                let prepared = external_buildpack::prepare(&ctx, workload, spec).await?;
                match self.check_skip(workload, &prepared.digest) {
                    Some(skipped) => skipped,
                    None => external_buildpack::build(&ctx, workload, spec, prepared).await?,
                }
            }
            Packaging::AutomaticBuildpack(spec) => {
                let prepared = nixpacks::prepare(&ctx, workload, spec).await?;
                match self.check_skip(workload, &prepared.digest) {
                    Some(skipped) => skipped,
                    None => nixpacks::build(&ctx, workload, spec, prepared).await?,
                }
            }
            Packaging::ImageBuildpack(spec) => image_buildpack::package(&ctx, workload, spec).await?,
            Packaging::LanguageNativeBuildpack(spec) => {
                language_native::package(&ctx, workload, spec).await?
            }
            Packaging::MetaFrameworkWeb(spec) => {
                return Ok(Packaged::Multiple(nextjs::package(&ctx, workload, spec).await?));
            }
        };
        Ok(Packaged::Single(packaged))
    }

    fn check_skip(&self, workload: &Workload, digest: &Digest) -> Option<BuildResult> {
        self.reporter.on_event(PackagingEvent::DigestComputed {
            workload: workload.name.clone(),
            digest: digest.clone(),
        });
        if should_skip(digest, &workload.existing_digests) {
            crate::log_digest_hit!(workload.name, digest);
            self.reporter.on_event(PackagingEvent::Skipped {
                workload: workload.name.clone(),
                digest: digest.clone(),
            });
            Some(BuildResult::skipped(&workload.name, digest.clone()))
        } else {
            crate::log_digest_miss!(workload.name, digest);
            None
        }
    }
}

/// The name scopes temp and output directories, so it must be a single path segment.
fn validate_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(PackagingError::InvalidWorkload {
            workload: name.to_string(),
            reason: "name must be a non-empty single path segment".to_string(),
        });
    }
    Ok(())
}
