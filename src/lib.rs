pub mod archive;
pub mod bundler;
pub mod config;
pub mod constants;
pub mod digest;
pub mod dispatcher;
pub mod dockerfile;
pub mod error;
pub mod hasher;
pub mod image;
pub mod logging;
pub mod process;
pub mod progress;
pub mod result;
pub mod strategies;
pub mod workload;

pub use config::EngineConfig;
pub use digest::{Digest, DigestBuilder, KnownDigests};
pub use dispatcher::{Packager, WorkloadReport};
pub use error::{ErrorKind, PackagingError, Result};
pub use result::{Artifact, BuildResult, Outcome, Packaged};
pub use workload::{Packaging, Workload};
