use crate::digest::Digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// A new artifact was produced
    Bundled,
    /// The digest was already deployed; nothing was produced
    Skipped,
}

/// What a bundled run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Artifact {
    #[serde(rename_all = "camelCase")]
    Archive {
        path: PathBuf,
        files: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        handler: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        tag: String,
        image_id: String,
        duration_ms: u64,
        created_at: DateTime<Utc>,
    },
}

/// Uniform result of one packaging run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// Workload name, or `<workload>-<function>` for fanned-out artifacts
    pub name: String,
    pub outcome: Outcome,
    pub digest: Digest,
    /// Artifact size in bytes; always `None` when skipped
    pub size: Option<u64>,
    pub artifact: Option<Artifact>,
}

impl BuildResult {
    pub fn skipped(name: impl Into<String>, digest: Digest) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Skipped,
            digest,
            size: None,
            artifact: None,
        }
    }

    pub fn bundled(name: impl Into<String>, digest: Digest, size: u64, artifact: Artifact) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Bundled,
            digest,
            size: Some(size),
            artifact: Some(artifact),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }
}

/// One result for most kinds; an ordered list for the multi-artifact web strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Packaged {
    Single(BuildResult),
    Multiple(Vec<BuildResult>),
}

impl Packaged {
    pub fn into_results(self) -> Vec<BuildResult> {
        match self {
            Self::Single(result) => vec![result],
            Self::Multiple(results) => results,
        }
    }

    pub fn results(&self) -> &[BuildResult] {
        match self {
            Self::Single(result) => std::slice::from_ref(result),
            Self::Multiple(results) => results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_serializes_null_size() {
        let result = BuildResult::skipped("api", Digest::from("abc"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert!(json["size"].is_null());
        assert!(json["artifact"].is_null());
    }

    #[test]
    fn test_archive_artifact_shape() {
        let result = BuildResult::bundled(
            "fn",
            Digest::from("abc"),
            10,
            Artifact::Archive {
                path: PathBuf::from("out/fn.zip"),
                files: vec!["index.js".to_string()],
                handler: Some("index.handler".to_string()),
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["artifact"]["type"], "archive");
        assert_eq!(json["artifact"]["handler"], "index.handler");
        assert_eq!(json["size"], 10);
        assert_eq!(Packaged::Single(result).into_results().len(), 1);
    }
}
