// Centralized constants for packsmith to avoid magic numbers

/// Largest artifact (uncompressed) accepted for upload: 250 MiB
pub const MAX_ARTIFACT_SIZE_BYTES: u64 = 250 * 1024 * 1024;

/// Number of trailing output lines kept from an external tool for error reports
pub const DEFAULT_OUTPUT_TAIL_LINES: usize = 200;

/// Default number of workloads packaged at once by `Packager::package_all`
pub const DEFAULT_PACKAGING_CONCURRENCY: usize = 4;

/// Builder image used by the external buildpack strategy when none is given
pub const DEFAULT_BUILDPACK_BUILDER: &str = "paketobuildpacks/builder-jammy-base";

/// JVM options forced on every buildpack build
pub const BUILDPACK_JVM_ENV: &str = "JAVA_TOOL_OPTIONS=-XX:+UseContainerSupport -XX:MaxRAMPercentage=75.0";

/// Version pin of the Next.js serverless adapter
pub const OPEN_NEXT_VERSION: &str = "3.1.3";

/// Token in the edge wrapper replaced with the environment at deploy time
pub const EDGE_ENV_PLACEHOLDER: &str = "{{__PACKSMITH_INJECTED_ENVIRONMENT__}}";

/// Name of the detection CLI config file written into the temp directory
pub const NIXPACKS_CONFIG_FILE_NAME: &str = "nixpacks.json";

/// Version-control metadata, the only thing dropped from pre-built artifacts
pub const VCS_EXCLUDE_GLOBS: &[&str] = &[".git", ".hg", ".svn"];

/// Globs excluded from source-tree checksums and bundles
pub const DEFAULT_EXCLUDE_GLOBS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules/.cache",
    "coverage",
    ".nyc_output",
    "__pycache__",
    "*.pyc",
    ".next",
    ".open-next",
    ".DS_Store",
];

/// Fixed modification time (1980-01-01, the zip epoch) stamped on archive entries
pub const ARCHIVE_MTIME: u64 = 315_532_800;

// Language versions used when the runtime identifier carries none
pub const DEFAULT_PYTHON_VERSION: &str = "3.12";
pub const DEFAULT_JAVA_VERSION: &str = "21";
pub const DEFAULT_GO_VERSION: &str = "1.22";
pub const DEFAULT_NODE_VERSION: &str = "20";
