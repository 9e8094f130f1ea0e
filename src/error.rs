/// Packaging error types and classification helpers
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, PackagingError>;

/// Broad classes used by callers to decide how to report a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing input, detected before any external process runs
    Input,
    /// A container engine or CLI exited unsuccessfully
    ExternalTool,
    /// Filesystem, archive or serialization failure inside the engine
    Internal,
}

/// Main error type for packaging operations
#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("source path {} does not exist or is not readable", .path.display())]
    SourceNotFound { path: PathBuf },

    #[error("cannot determine the {language} package manager for {}: {reason}", .path.display())]
    UnresolvablePackageManager {
        language: String,
        path: PathBuf,
        reason: String,
    },

    #[error("unsupported language for entry file {entryfile}")]
    UnsupportedLanguage { entryfile: String },

    #[error("invalid workload '{workload}': {reason}")]
    InvalidWorkload { workload: String, reason: String },

    #[error(
        "artifact for '{workload}' is {actual_bytes} bytes, which exceeds the maximum allowed size of {limit_bytes} bytes ({} MB). Exclude unnecessary files or switch to a container-based packaging.",
        .limit_bytes / (1024 * 1024)
    )]
    SizeLimitExceeded {
        workload: String,
        actual_bytes: u64,
        limit_bytes: u64,
    },

    #[error("{tool} failed (exit code {}) while running `{command}`:\n{output}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    ExternalTool {
        tool: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("expected build output {} was not produced", .path.display())]
    MissingBuildOutput { path: PathBuf },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PackagingError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound { .. }
            | Self::UnresolvablePackageManager { .. }
            | Self::UnsupportedLanguage { .. }
            | Self::InvalidWorkload { .. }
            | Self::SizeLimitExceeded { .. } => ErrorKind::Input,
            Self::ExternalTool { .. } | Self::MissingBuildOutput { .. } => ErrorKind::ExternalTool,
            Self::Io { .. } | Self::Archive(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// A failed compile or a missing base image is not transient, so nothing here is retried.
pub fn is_retryable(_err: &PackagingError) -> bool {
    false
}

/// Attach a path to an `io::Error`, the way every filesystem call in the crate reports failures.
pub trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| PackagingError::io(path, e))
    }
}
