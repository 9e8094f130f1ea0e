use crate::constants::{
    DEFAULT_BUILDPACK_BUILDER, DEFAULT_EXCLUDE_GLOBS, DEFAULT_OUTPUT_TAIL_LINES,
    MAX_ARTIFACT_SIZE_BYTES, OPEN_NEXT_VERSION,
};
use crate::hasher::ExcludeRules;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine-wide settings: external tool binaries, directory roots and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub container_engine: String,
    pub pack_binary: String,
    pub nixpacks_binary: String,
    pub npx_binary: String,
    /// Parent of the per-invocation temporary directories
    pub work_dir: PathBuf,
    /// Parent of the per-workload artifact directories
    pub output_dir: PathBuf,
    pub max_artifact_bytes: u64,
    pub default_builder: String,
    pub open_next_version: String,
    pub exclude_globs: Vec<String>,
    pub output_tail_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            container_engine: "docker".to_string(),
            pack_binary: "pack".to_string(),
            nixpacks_binary: "nixpacks".to_string(),
            npx_binary: "npx".to_string(),
            work_dir: std::env::temp_dir().join("packsmith"),
            output_dir: PathBuf::from(".packsmith").join("artifacts"),
            max_artifact_bytes: MAX_ARTIFACT_SIZE_BYTES,
            default_builder: DEFAULT_BUILDPACK_BUILDER.to_string(),
            open_next_version: OPEN_NEXT_VERSION.to_string(),
            exclude_globs: DEFAULT_EXCLUDE_GLOBS.iter().map(|g| g.to_string()).collect(),
            output_tail_lines: DEFAULT_OUTPUT_TAIL_LINES,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `PACKSMITH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup("PACKSMITH_CONTAINER_ENGINE") {
            config.container_engine = v;
        }
        if let Some(v) = lookup("PACKSMITH_PACK_BIN") {
            config.pack_binary = v;
        }
        if let Some(v) = lookup("PACKSMITH_NIXPACKS_BIN") {
            config.nixpacks_binary = v;
        }
        if let Some(v) = lookup("PACKSMITH_NPX_BIN") {
            config.npx_binary = v;
        }
        if let Some(v) = lookup("PACKSMITH_WORK_DIR") {
            config.work_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PACKSMITH_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PACKSMITH_MAX_ARTIFACT_BYTES") {
            match v.parse::<u64>() {
                Ok(bytes) => config.max_artifact_bytes = bytes,
                Err(_) => tracing::warn!(value = %v, "Ignoring invalid PACKSMITH_MAX_ARTIFACT_BYTES"),
            }
        }
        config
    }

    pub fn exclude_rules(&self) -> ExcludeRules {
        ExcludeRules::from_globs(&self.exclude_globs)
    }
}
