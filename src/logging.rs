use std::io;
/// Structured logging and batch metrics for packsmith
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize structured logging with optional JSON output
pub fn init_logging(json_output: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("packsmith=info"));

    let registry = Registry::default().with(env_filter);

    if json_output {
        // JSON output for log aggregation
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

/// Outcome counters for a batch of packaging runs
#[derive(Debug, Clone, Default)]
pub struct PackagingMetrics {
    pub total_workloads: u64,
    pub bundled: u64,
    pub skipped: u64,
    pub failed: u64,
    pub total_duration_ms: u64,
    pub total_artifact_bytes: u64,
}

impl PackagingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of produced results that were served by an existing digest.
    pub fn skip_rate(&self) -> f64 {
        let total = self.bundled + self.skipped;
        if total == 0 {
            0.0
        } else {
            (self.skipped as f64) / (total as f64)
        }
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.total_workloads == 0 {
            0.0
        } else {
            (self.total_duration_ms as f64) / (self.total_workloads as f64)
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_workloads == 0 {
            0.0
        } else {
            ((self.total_workloads - self.failed) as f64) / (self.total_workloads as f64)
        }
    }
}

#[macro_export]
macro_rules! log_digest_hit {
    ($workload:expr, $digest:expr) => {
        tracing::info!(
            workload = %$workload,
            digest = %$digest.prefix(8),
            "Digest already deployed, skipping"
        );
    };
}

#[macro_export]
macro_rules! log_digest_miss {
    ($workload:expr, $digest:expr) => {
        tracing::debug!(
            workload = %$workload,
            digest = %$digest.prefix(8),
            "Digest not deployed, building"
        );
    };
}

#[macro_export]
macro_rules! log_artifact_ready {
    ($workload:expr, $location:expr, $size:expr) => {
        tracing::info!(
            workload = %$workload,
            location = %$location,
            size_bytes = $size,
            "Artifact ready"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_rate_calculation() {
        let mut metrics = PackagingMetrics::new();
        metrics.bundled = 25;
        metrics.skipped = 75;
        assert!((metrics.skip_rate() - 0.75).abs() < 0.01);
    }

    #[test]
    fn test_success_rate() {
        let mut metrics = PackagingMetrics::new();
        metrics.total_workloads = 10;
        metrics.failed = 1;
        assert!((metrics.success_rate() - 0.9).abs() < 0.01);
    }

    #[test]
    fn test_zero_metrics() {
        let metrics = PackagingMetrics::new();
        assert_eq!(metrics.skip_rate(), 0.0);
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.average_duration_ms(), 0.0);
    }
}
