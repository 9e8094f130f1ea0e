//! Content digest engine.
//!
//! A digest merges labelled partial hashes (source tree, dependency set,
//! language configuration, additional caller input). The merge sorts by
//! label, so the order in which parts are added never matters, while a
//! change in any part changes the result.

use crate::error::Result;
use crate::hasher::{self, FileFingerprint};
use crate::workload::Dependency;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Deterministic fingerprint of a workload's build inputs (64 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` characters, or the whole digest when shorter.
    pub fn prefix(&self, len: usize) -> &str {
        match self.0.char_indices().nth(len) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    /// First 12 characters, used in image tags and log lines.
    pub fn short(&self) -> &str {
        self.prefix(12)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Digest {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Membership test over digests already deployed. Storage and eviction are the caller's business.
pub trait KnownDigests {
    fn contains_digest(&self, digest: &Digest) -> bool;
}

impl KnownDigests for BTreeSet<Digest> {
    fn contains_digest(&self, digest: &Digest) -> bool {
        self.contains(digest)
    }
}

impl KnownDigests for HashSet<Digest> {
    fn contains_digest(&self, digest: &Digest) -> bool {
        self.contains(digest)
    }
}


/// Exact-match cache lookup: skip iff the digest was already produced.
pub fn should_skip<K: KnownDigests + ?Sized>(digest: &Digest, known: &K) -> bool {
    known.contains_digest(digest)
}

/// Collects labelled partial hashes and merges them into one [`Digest`].
#[derive(Debug, Default, Clone)]
pub struct DigestBuilder {
    parts: BTreeMap<String, String>,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an already computed partial hash under `label`. Re-using a label replaces the earlier value.
    pub fn part(mut self, label: &str, value: impl Into<String>) -> Self {
        self.parts.insert(label.to_string(), value.into());
        self
    }

    pub fn source_checksum(self, checksum: impl Into<String>) -> Self {
        self.part("sources", checksum)
    }

    pub fn sources(self, fingerprints: &[FileFingerprint]) -> Self {
        let checksum = hasher::checksum(fingerprints);
        self.source_checksum(checksum)
    }

    pub fn dependencies(self, dependencies: &[Dependency]) -> Self {
        let hash = hash_dependencies(dependencies);
        self.part("dependencies", hash)
    }

    /// Structural hash of any serializable configuration.
    pub fn config<T: Serialize + ?Sized>(self, label: &str, config: &T) -> Result<Self> {
        let hash = hash_structured(config)?;
        Ok(self.part(label, hash))
    }

    pub fn additional(self, input: Option<&str>) -> Self {
        match input {
            Some(value) => self.part("additional", hash_text(value)),
            None => self,
        }
    }

    pub fn finish(self) -> Digest {
        Digest(merge(&self.parts))
    }
}

/// Hash the stable `name@version` pairs of a dependency set, independent of order.
/// Local (`file:`-style) or unresolved versions are left out.
pub fn hash_dependencies(dependencies: &[Dependency]) -> String {
    let pairs: BTreeSet<String> = dependencies
        .iter()
        .filter(|d| d.has_stable_version())
        .map(|d| format!("{}@{}", d.name, d.version.as_deref().unwrap_or_default()))
        .collect();

    let mut hasher = blake3::Hasher::new();
    for pair in pairs {
        hasher.update(pair.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Structural hash: object keys are hashed in sorted order, so two configs
/// differing only in key insertion order hash the same.
pub fn hash_structured<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    let mut text = String::new();
    write_canonical(&value, &mut text)?;
    Ok(hash_text(&text))
}

// Keys are sorted explicitly: serde_json keeps insertion order when `preserve_order` is enabled.
fn write_canonical(value: &serde_json::Value, out: &mut String) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

pub fn hash_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

fn merge(parts: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"packsmith-digest-v1\n");
    for (label, value) in parts {
        hasher.update(label.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::{LanguageConfig, PythonConfig};

    fn base() -> DigestBuilder {
        DigestBuilder::new()
            .sources(&[FileFingerprint::from_bytes("main.py", b"x = 1")])
            .dependencies(&[Dependency::new("requests", "2.31.0")])
    }

    #[test]
    fn test_short_respects_char_boundaries() {
        let digest = Digest::from(format!("{}-tail", "é".repeat(13)).as_str());
        assert_eq!(digest.short(), "é".repeat(12));
        assert_eq!(Digest::from("abc").short(), "abc");
        assert_eq!(base().finish().short().len(), 12);
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(base().finish(), base().finish());
    }

    #[test]
    fn test_merge_independent_of_call_order() {
        let a = DigestBuilder::new()
            .part("sources", "s")
            .part("dependencies", "d")
            .finish();
        let b = DigestBuilder::new()
            .part("dependencies", "d")
            .part("sources", "s")
            .finish();
        assert_eq!(a, b);
    }

    #[test]
    fn test_config_change_changes_digest() {
        let minified = LanguageConfig::Python(PythonConfig {
            minify: true,
            ..Default::default()
        });
        let plain = LanguageConfig::Python(PythonConfig::default());
        let a = base().config("language", &minified).unwrap().finish();
        let b = base().config("language", &plain).unwrap().finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_additional_input_changes_digest() {
        let a = base().additional(Some("STAGE=prod")).finish();
        let b = base().additional(Some("STAGE=dev")).finish();
        let c = base().additional(None).finish();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_dependency_order_and_local_versions() {
        let one = hash_dependencies(&[
            Dependency::new("a", "1.0.0"),
            Dependency::new("b", "2.0.0"),
        ]);
        let two = hash_dependencies(&[
            Dependency::new("b", "2.0.0"),
            Dependency::new("a", "1.0.0"),
            Dependency::new("local", "file:../local"),
        ]);
        assert_eq!(one, two);
        assert_ne!(one, hash_dependencies(&[Dependency::new("a", "1.0.1")]));
    }

    #[test]
    fn test_structured_hash_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":{"c":2,"d":3}}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":{"d":3,"c":2},"a":1}"#).unwrap();
        assert_eq!(hash_structured(&a).unwrap(), hash_structured(&b).unwrap());
    }

    #[test]
    fn test_skip_is_exact_membership() {
        let digest = base().finish();
        let mut known = BTreeSet::new();
        assert!(!should_skip(&digest, &known));
        known.insert(Digest::from(&digest.as_str()[..63]));
        assert!(!should_skip(&digest, &known));
        known.insert(digest.clone());
        assert!(should_skip(&digest, &known));
    }
}
