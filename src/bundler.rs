//! Language bundler contract and the default source-tree bundler.
//!
//! A bundler turns a workload's project directory into a build-ready
//! directory and a digest. When the digest is already deployed it must
//! return `Skipped` without touching the filesystem.

use crate::constants::{
    DEFAULT_GO_VERSION, DEFAULT_JAVA_VERSION, DEFAULT_NODE_VERSION, DEFAULT_PYTHON_VERSION,
};
use crate::digest::{should_skip, Digest, DigestBuilder};
use crate::error::{IoContext, PackagingError, Result};
use crate::hasher::{fingerprint_files, walk_dir, ExcludeRules, WalkedFile};
use crate::result::Outcome;
use crate::workload::{
    EntryPoint, JavaBuildTool, JsPackageManager, LanguageConfig, PythonPackageManager,
    PythonRunMode, Workload,
};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
    Java,
    Go,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "mts" | "cts" | "tsx" => Some(Self::Javascript),
            "py" => Some(Self::Python),
            "java" | "kt" | "kts" | "groovy" | "scala" => Some(Self::Java),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    pub fn from_runtime(runtime: &str) -> Option<Self> {
        let runtime = runtime.to_ascii_lowercase();
        if runtime.starts_with("nodejs") || runtime.starts_with("node") {
            Some(Self::Javascript)
        } else if runtime.starts_with("python") {
            Some(Self::Python)
        } else if runtime.starts_with("java") {
            Some(Self::Java)
        } else if runtime.starts_with("go") {
            Some(Self::Go)
        } else {
            None
        }
    }

    /// Entry file extension first, then runtime identifier, then the config variant.
    pub fn detect(workload: &Workload) -> Result<Self> {
        let entry = workload.entry_point();
        let from_entry = entry
            .as_ref()
            .and_then(|e| e.extension())
            .and_then(Self::from_extension);
        let from_runtime = workload.runtime.as_deref().and_then(Self::from_runtime);
        let from_config = match workload.language_config {
            LanguageConfig::Javascript(_) => Some(Self::Javascript),
            LanguageConfig::Python(_) => Some(Self::Python),
            LanguageConfig::Java(_) => Some(Self::Java),
            LanguageConfig::Go(_) => Some(Self::Go),
            LanguageConfig::None => None,
        };
        from_entry
            .or(from_runtime)
            .or(from_config)
            .ok_or_else(|| PackagingError::UnsupportedLanguage {
                entryfile: workload.entryfile.clone().unwrap_or_default(),
            })
    }

    pub fn default_version(&self) -> &'static str {
        match self {
            Self::Javascript => DEFAULT_NODE_VERSION,
            Self::Python => DEFAULT_PYTHON_VERSION,
            Self::Java => DEFAULT_JAVA_VERSION,
            Self::Go => DEFAULT_GO_VERSION,
        }
    }

    /// Version part of a runtime identifier: `python3.12` -> `3.12`, `nodejs20.x` -> `20`.
    pub fn version_from_runtime(&self, runtime: Option<&str>) -> String {
        let version = runtime
            .map(|r| r.trim_start_matches(|c: char| c.is_ascii_alphabetic()))
            .map(|v| v.trim_end_matches(".x").trim_matches('.'))
            .unwrap_or_default();
        if version.is_empty() {
            self.default_version().to_string()
        } else {
            version.to_string()
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Javascript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Go => "go",
        };
        f.write_str(name)
    }
}

/// Language settings after defaults and lockfile detection are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "language", rename_all = "lowercase")]
pub enum ResolvedLanguage {
    Javascript {
        package_manager: JsPackageManager,
        minify: bool,
    },
    Python {
        package_manager: PythonPackageManager,
        minify: bool,
        run_app_as: PythonRunMode,
    },
    Java {
        build_tool: JavaBuildTool,
    },
    Go {
        ldflags: Option<String>,
    },
}

pub struct BundleRequest<'a> {
    pub workload: &'a Workload,
    pub source_dir: &'a Path,
    /// Per-invocation scratch directory the bundle may be written into
    pub build_dir: &'a Path,
    pub exclude: &'a ExcludeRules,
    /// Settings of the calling strategy that also shape the artifact
    pub strategy_inputs: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct BundleOutput {
    pub outcome: Outcome,
    pub digest: Digest,
    /// Build-ready directory; `None` when skipped
    pub dist_dir: Option<PathBuf>,
    pub files: Vec<String>,
    pub entry: EntryPoint,
    pub language: Language,
    pub language_version: String,
    pub resolved: ResolvedLanguage,
}

#[async_trait]
pub trait LanguageBundler: Send + Sync {
    async fn bundle(&self, request: &BundleRequest<'_>) -> Result<BundleOutput>;
}

/// Copies the project tree as-is; dependency installation happens in the image build.
pub struct SourceTreeBundler;

#[async_trait]
impl LanguageBundler for SourceTreeBundler {
    async fn bundle(&self, request: &BundleRequest<'_>) -> Result<BundleOutput> {
        let workload = request.workload;
        let source_dir = request.source_dir;
        if !source_dir.is_dir() {
            return Err(PackagingError::SourceNotFound {
                path: source_dir.to_path_buf(),
            });
        }

        let language = Language::detect(workload)?;
        let entry = workload
            .entry_point()
            .ok_or_else(|| PackagingError::InvalidWorkload {
                workload: workload.name.clone(),
                reason: "an entry file is required for language bundling".to_string(),
            })?;
        let entry_path = source_dir.join(&entry.entryfile_path);
        if !entry_path.is_file() {
            return Err(PackagingError::SourceNotFound { path: entry_path });
        }

        let resolved = resolve_language(language, &workload.language_config, source_dir)?;
        let language_version = language.version_from_runtime(workload.runtime.as_deref());

        let (walked, fingerprints) = {
            let root = source_dir.to_path_buf();
            let exclude = request.exclude.clone();
            tokio::task::spawn_blocking(move || -> Result<_> {
                let walked = walk_dir(&root, &exclude)?;
                let fingerprints = fingerprint_files(&walked)?;
                Ok((walked, fingerprints))
            })
            .await
            .map_err(|e| join_error(source_dir, e))??
        };

        let digest = DigestBuilder::new()
            .sources(&fingerprints)
            .dependencies(&workload.dependencies)
            .config("language", &resolved)?
            .config("entrypoint", &entry)?
            .config("strategy", &request.strategy_inputs)?
            .part("runtime", format!("{}{}", language, language_version))
            .additional(workload.additional_digest_input.as_deref())
            .finish();

        let file_list: Vec<String> = walked.iter().map(|f| f.relative.clone()).collect();

        if should_skip(&digest, &workload.existing_digests) {
            return Ok(BundleOutput {
                outcome: Outcome::Skipped,
                digest,
                dist_dir: None,
                files: file_list,
                entry,
                language,
                language_version,
                resolved,
            });
        }

        let dist_dir = request.build_dir.join(format!("{}-bundle", language));
        {
            let dist_dir = dist_dir.clone();
            tokio::task::spawn_blocking(move || copy_walked(&walked, &dist_dir))
                .await
                .map_err(|e| join_error(source_dir, e))??;
        }

        tracing::debug!(
            workload = %workload.name,
            language = %language,
            files = file_list.len(),
            dist = %dist_dir.display(),
            "Bundle assembled"
        );

        Ok(BundleOutput {
            outcome: Outcome::Bundled,
            digest,
            dist_dir: Some(dist_dir),
            files: file_list,
            entry,
            language,
            language_version,
            resolved,
        })
    }
}

pub(crate) fn join_error(path: &Path, err: tokio::task::JoinError) -> PackagingError {
    PackagingError::io(path, std::io::Error::other(err))
}

pub(crate) fn copy_walked(files: &[WalkedFile], dest: &Path) -> Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest).at(dest)?;
    }
    fs::create_dir_all(dest).at(dest)?;
    for file in files {
        let target = dest.join(&file.relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        fs::copy(&file.absolute, &target).at(&file.absolute)?;
    }
    Ok(())
}

/// Apply explicit settings, falling back to what the project files imply.
pub fn resolve_language(
    language: Language,
    config: &LanguageConfig,
    source_dir: &Path,
) -> Result<ResolvedLanguage> {
    let has = |name: &str| source_dir.join(name).exists();

    let resolved = match language {
        Language::Javascript => {
            let (explicit, minify) = match config {
                LanguageConfig::Javascript(js) => (js.package_manager, js.minify),
                _ => (None, false),
            };
            let package_manager = explicit.unwrap_or(if has("pnpm-lock.yaml") {
                JsPackageManager::Pnpm
            } else if has("yarn.lock") {
                JsPackageManager::Yarn
            } else if has("bun.lockb") || has("bun.lock") {
                JsPackageManager::Bun
            } else {
                JsPackageManager::Npm
            });
            ResolvedLanguage::Javascript {
                package_manager,
                minify,
            }
        }
        Language::Python => {
            let (explicit, minify, run_app_as) = match config {
                LanguageConfig::Python(py) => (py.package_manager, py.minify, py.run_app_as),
                _ => (None, false, None),
            };
            let package_manager = match explicit {
                Some(pm) => pm,
                None if has("poetry.lock") => PythonPackageManager::Poetry,
                None if has("Pipfile") => PythonPackageManager::Pipenv,
                None if has("uv.lock") => PythonPackageManager::Uv,
                None if has("requirements.txt") || has("pyproject.toml") => {
                    PythonPackageManager::Pip
                }
                None => {
                    return Err(PackagingError::UnresolvablePackageManager {
                        language: "python".to_string(),
                        path: source_dir.to_path_buf(),
                        reason: "no requirements.txt, pyproject.toml, Pipfile, poetry.lock or uv.lock found".to_string(),
                    })
                }
            };
            ResolvedLanguage::Python {
                package_manager,
                minify,
                run_app_as: run_app_as.unwrap_or(PythonRunMode::Script),
            }
        }
        Language::Java => {
            let use_maven = match config {
                LanguageConfig::Java(java) => java.use_maven,
                _ => false,
            };
            let gradle = has("build.gradle") || has("build.gradle.kts");
            let build_tool = if use_maven || (has("pom.xml") && !gradle) {
                JavaBuildTool::Maven
            } else {
                JavaBuildTool::Gradle
            };
            ResolvedLanguage::Java { build_tool }
        }
        Language::Go => {
            if !has("go.mod") {
                return Err(PackagingError::UnresolvablePackageManager {
                    language: "go".to_string(),
                    path: source_dir.to_path_buf(),
                    reason: "go.mod not found".to_string(),
                });
            }
            let ldflags = match config {
                LanguageConfig::Go(go) => go.ldflags.clone(),
                _ => None,
            };
            ResolvedLanguage::Go { ldflags }
        }
    };
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::{JavaConfig, Packaging, PythonConfig};
    use tempfile::tempdir;

    fn python_workload() -> Workload {
        let mut w = Workload::new(
            "worker",
            Packaging::LanguageNativeBuildpack(crate::workload::LanguageNativeBuildpack {
                source_directory_path: PathBuf::from("."),
                executable_patterns: vec![],
            }),
        );
        w.entryfile = Some("main.py:handler".to_string());
        w
    }

    #[test]
    fn test_language_detection() {
        let w = python_workload();
        assert_eq!(Language::detect(&w).unwrap(), Language::Python);

        let mut w = python_workload();
        w.entryfile = None;
        w.runtime = Some("java21".to_string());
        assert_eq!(Language::detect(&w).unwrap(), Language::Java);

        let mut w = python_workload();
        w.entryfile = Some("script.rb".to_string());
        assert!(Language::detect(&w).is_err());
    }

    #[test]
    fn test_version_from_runtime() {
        assert_eq!(Language::Python.version_from_runtime(Some("python3.12")), "3.12");
        assert_eq!(Language::Javascript.version_from_runtime(Some("nodejs20.x")), "20");
        assert_eq!(Language::Java.version_from_runtime(Some("java17")), "17");
        assert_eq!(Language::Go.version_from_runtime(None), DEFAULT_GO_VERSION);
    }

    #[test]
    fn test_python_package_manager_resolution() {
        let dir = tempdir().unwrap();
        let err = resolve_language(Language::Python, &LanguageConfig::None, dir.path()).unwrap_err();
        assert!(matches!(err, PackagingError::UnresolvablePackageManager { .. }));

        fs::write(dir.path().join("poetry.lock"), "").unwrap();
        let resolved = resolve_language(Language::Python, &LanguageConfig::None, dir.path()).unwrap();
        assert!(matches!(
            resolved,
            ResolvedLanguage::Python {
                package_manager: PythonPackageManager::Poetry,
                ..
            }
        ));

        let explicit = LanguageConfig::Python(PythonConfig {
            package_manager: Some(PythonPackageManager::Uv),
            ..Default::default()
        });
        let resolved = resolve_language(Language::Python, &explicit, dir.path()).unwrap();
        assert!(matches!(
            resolved,
            ResolvedLanguage::Python {
                package_manager: PythonPackageManager::Uv,
                ..
            }
        ));
    }

    #[test]
    fn test_java_build_tool_resolution() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();
        let resolved = resolve_language(Language::Java, &LanguageConfig::None, dir.path()).unwrap();
        assert_eq!(resolved, ResolvedLanguage::Java { build_tool: JavaBuildTool::Maven });

        fs::write(dir.path().join("build.gradle"), "").unwrap();
        let resolved = resolve_language(Language::Java, &LanguageConfig::None, dir.path()).unwrap();
        assert_eq!(resolved, ResolvedLanguage::Java { build_tool: JavaBuildTool::Gradle });

        let maven = LanguageConfig::Java(JavaConfig { use_maven: true });
        let resolved = resolve_language(Language::Java, &maven, dir.path()).unwrap();
        assert_eq!(resolved, ResolvedLanguage::Java { build_tool: JavaBuildTool::Maven });
    }

    #[test]
    fn test_go_requires_module_file() {
        let dir = tempdir().unwrap();
        assert!(resolve_language(Language::Go, &LanguageConfig::None, dir.path()).is_err());
        fs::write(dir.path().join("go.mod"), "module example.com/app").unwrap();
        assert!(resolve_language(Language::Go, &LanguageConfig::None, dir.path()).is_ok());
    }
}
