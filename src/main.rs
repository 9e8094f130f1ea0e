use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use packsmith::constants::DEFAULT_PACKAGING_CONCURRENCY;
use packsmith::hasher::{self, ExcludeRules};
use packsmith::logging::init_logging;
use packsmith::{EngineConfig, Packager, Workload};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "packsmith")]
#[command(about = "Package workloads into deployable archives and images", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "PACKSMITH_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package workload descriptors (JSON files) and print the build results
    Package {
        #[arg(required = true)]
        workloads: Vec<PathBuf>,

        /// Maximum number of workloads packaged at once
        #[arg(short, long, default_value_t = DEFAULT_PACKAGING_CONCURRENCY)]
        concurrency: usize,
    },
    /// Print the checksum of a directory or file
    Checksum {
        path: PathBuf,

        /// Extra exclude glob (can be specified multiple times)
        #[arg(short, long = "exclude")]
        exclude: Vec<String>,

        /// File with one exclude glob per line, e.g. a `.dockerignore`
        #[arg(long)]
        ignore_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs).map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Package {
            workloads,
            concurrency,
        } => package(workloads, concurrency).await,
        Commands::Checksum {
            path,
            exclude,
            ignore_file,
        } => {
            let mut rules = ExcludeRules::defaults().extend(&ExcludeRules::from_globs(&exclude));
            if let Some(file) = ignore_file {
                rules = rules.extend(&ExcludeRules::from_file(&file));
            }
            let checksum = hasher::directory_checksum(&path, &rules)
                .with_context(|| format!("failed to checksum {}", path.display()))?;
            println!("{}", checksum);
            Ok(())
        }
    }
}

async fn package(paths: Vec<PathBuf>, concurrency: usize) -> Result<()> {
    let mut workloads = Vec::with_capacity(paths.len());
    for path in &paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let workload: Workload = serde_json::from_str(&text)
            .with_context(|| format!("invalid workload descriptor {}", path.display()))?;
        workloads.push(workload);
    }

    let packager = Packager::new(EngineConfig::from_env());
    let (reports, metrics) = packager.package_all(&workloads, concurrency).await;

    let mut output = Vec::with_capacity(reports.len());
    for report in &reports {
        let entry = match &report.result {
            Ok(packaged) => json!({
                "workload": report.workload,
                "durationMs": report.duration_ms,
                "results": packaged.results(),
            }),
            Err(e) => json!({
                "workload": report.workload,
                "durationMs": report.duration_ms,
                "error": e.to_string(),
            }),
        };
        output.push(entry);
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    tracing::info!(
        average_duration_ms = metrics.average_duration_ms(),
        total_artifact_bytes = metrics.total_artifact_bytes,
        "Batch summary"
    );

    if metrics.failed > 0 {
        anyhow::bail!(
            "{} of {} workloads failed to package",
            metrics.failed,
            metrics.total_workloads
        );
    }
    Ok(())
}
