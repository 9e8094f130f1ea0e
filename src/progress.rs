use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured packaging events handed to a [`ProgressReporter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PackagingEvent {
    Started {
        workload: String,
        kind: String,
    },
    DigestComputed {
        workload: String,
        digest: Digest,
    },
    Skipped {
        workload: String,
        digest: Digest,
    },
    ToolStarted {
        workload: String,
        command: String,
    },
    ArtifactReady {
        workload: String,
        location: String,
        size_bytes: u64,
    },
    Finished {
        workload: String,
        duration_ms: u64,
    },
    Failed {
        workload: String,
        error: String,
    },
}

impl fmt::Display for PackagingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { workload, kind } => write!(f, "Packaging {} ({})", workload, kind),
            Self::DigestComputed { workload, digest } => {
                write!(f, "Digest for {}: {}", workload, digest.short())
            }
            Self::Skipped { workload, digest } => {
                write!(f, "Skipping {}: digest {} already deployed", workload, digest.short())
            }
            Self::ToolStarted { workload, command } => {
                write!(f, "Running for {}: {}", workload, command)
            }
            Self::ArtifactReady {
                workload,
                location,
                size_bytes,
            } => write!(f, "Artifact for {} ready at {} ({} bytes)", workload, location, size_bytes),
            Self::Finished {
                workload,
                duration_ms,
            } => write!(f, "Packaged {} in {}ms", workload, duration_ms),
            Self::Failed { workload, error } => write!(f, "Packaging {} failed: {}", workload, error),
        }
    }
}

/// Receives streamed tool output and packaging events. Must tolerate concurrent calls.
pub trait ProgressReporter: Send + Sync {
    fn on_output(&self, workload: &str, line: &str);
    fn on_event(&self, event: PackagingEvent);
}

/// Default reporter: everything goes through `tracing`.
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn on_output(&self, workload: &str, line: &str) {
        tracing::debug!(target: "packsmith::tool_output", workload, "{}", line);
    }

    fn on_event(&self, event: PackagingEvent) {
        match &event {
            PackagingEvent::Failed { .. } => tracing::error!("{}", event),
            PackagingEvent::ToolStarted { .. } => tracing::debug!("{}", event),
            _ => tracing::info!("{}", event),
        }
    }
}

pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_output(&self, _workload: &str, _line: &str) {}
    fn on_event(&self, _event: PackagingEvent) {}
}
