//! Workload descriptors handed to the packager by the configuration compiler.
//!
//! A [`Workload`] is built fresh for every packaging invocation and never
//! mutated by the engine.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// Logical resource name, also used to scope temp and output directories
    pub name: String,
    pub packaging: Packaging,
    /// Runtime identifier such as `python3.12`, `java21` or `nodejs20.x`
    #[serde(default)]
    pub runtime: Option<String>,
    /// Entry file relative to the source directory, optionally `file:handler`
    #[serde(default)]
    pub entryfile: Option<String>,
    #[serde(default)]
    pub language_config: LanguageConfig,
    #[serde(default)]
    pub requires_glibc_binaries: bool,
    /// Target platform, e.g. `linux/arm64`, forwarded verbatim to the engine
    #[serde(default)]
    pub platform: Option<String>,
    /// Pre-resolved external dependencies (name + version)
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub existing_digests: BTreeSet<Digest>,
    #[serde(default)]
    pub additional_digest_input: Option<String>,
    /// Tag for image-producing strategies; defaults to `<name>:<digest prefix>`
    #[serde(default)]
    pub image_tag: Option<String>,
}

impl Workload {
    pub fn new(name: impl Into<String>, packaging: Packaging) -> Self {
        Self {
            name: name.into(),
            packaging,
            runtime: None,
            entryfile: None,
            language_config: LanguageConfig::default(),
            requires_glibc_binaries: false,
            platform: None,
            dependencies: Vec::new(),
            existing_digests: BTreeSet::new(),
            additional_digest_input: None,
            image_tag: None,
        }
    }

    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.entryfile.as_deref().map(EntryPoint::parse)
    }

    /// Image tag for a freshly computed digest.
    pub fn image_tag_for(&self, digest: &Digest) -> String {
        match &self.image_tag {
            Some(tag) => tag.clone(),
            None => format!("{}:{}", self.name.to_lowercase(), digest.short()),
        }
    }
}

/// One variant per packaging kind. The dispatcher matches on this exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Packaging {
    CustomArtifact(CustomArtifact),
    CustomDockerfile(CustomDockerfile),
    ExternalBuildpack(ExternalBuildpack),
    #[serde(alias = "nixpacks")]
    AutomaticBuildpack(AutomaticBuildpack),
    #[serde(rename = "stacktape-image-buildpack")]
    ImageBuildpack(ImageBuildpack),
    MetaFrameworkWeb(MetaFrameworkWeb),
    LanguageNativeBuildpack(LanguageNativeBuildpack),
}

impl Packaging {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::CustomArtifact(_) => "custom-artifact",
            Self::CustomDockerfile(_) => "custom-dockerfile",
            Self::ExternalBuildpack(_) => "external-buildpack",
            Self::AutomaticBuildpack(_) => "automatic-buildpack",
            Self::ImageBuildpack(_) => "stacktape-image-buildpack",
            Self::MetaFrameworkWeb(_) => "meta-framework-web",
            Self::LanguageNativeBuildpack(_) => "language-native-buildpack",
        }
    }
}

impl fmt::Display for Packaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomArtifact {
    /// Pre-built directory or an already zipped file
    pub package_path: PathBuf,
    /// Handler identifier passed through to the deployment
    #[serde(default)]
    pub handler: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDockerfile {
    pub build_context_path: PathBuf,
    /// Dockerfile relative to the build context
    #[serde(default)]
    pub dockerfile_path: Option<PathBuf>,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalBuildpack {
    pub source_directory_path: PathBuf,
    #[serde(default)]
    pub builder: Option<String>,
    #[serde(default)]
    pub buildpacks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomaticBuildpack {
    pub source_directory_path: PathBuf,
    #[serde(default)]
    pub build_image: Option<String>,
    #[serde(default)]
    pub phases: Vec<BuildPhase>,
    #[serde(default)]
    pub start_cmd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPhase {
    pub name: String,
    #[serde(default)]
    pub cmds: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuildpack {
    /// Project root the entry file is relative to
    pub source_directory_path: PathBuf,
    /// Commands appended verbatim as `RUN` steps of the generated Dockerfile
    #[serde(default)]
    pub custom_build_commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageNativeBuildpack {
    pub source_directory_path: PathBuf,
    /// Globs marked executable inside the produced zip
    #[serde(default)]
    pub executable_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaFrameworkWeb {
    pub app_directory: PathBuf,
    /// Also produce a server edge-function wrapper
    #[serde(default)]
    pub use_edge_lambda: bool,
    /// Injected into the framework build
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    /// Versions that point at the local filesystem differ across machines and are not hashed.
    pub fn has_stable_version(&self) -> bool {
        match self.version.as_deref().map(str::trim) {
            None | Some("") | Some("*") => false,
            Some(v) => {
                !(v.starts_with("file:")
                    || v.starts_with("link:")
                    || v.starts_with("portal:")
                    || v.starts_with("workspace:")
                    || v.starts_with("./")
                    || v.starts_with("../")
                    || v.starts_with('/'))
            }
        }
    }
}

/// Entry file with an optional explicit handler (`main.py:handler`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub entryfile_path: String,
    pub handler: Option<String>,
}

impl EntryPoint {
    pub fn parse(raw: &str) -> Self {
        match raw.rsplit_once(':') {
            // Windows drive letters (`C:\app\main.py`) are not handler suffixes.
            Some((file, handler))
                if !handler.is_empty() && !handler.contains(['/', '\\']) && !file.is_empty() =>
            {
                Self {
                    entryfile_path: file.to_string(),
                    handler: Some(handler.to_string()),
                }
            }
            _ => Self {
                entryfile_path: raw.to_string(),
                handler: None,
            },
        }
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.entryfile_path)
            .extension()
            .and_then(|e| e.to_str())
    }

    /// Entry file with its extension removed (`./src/index.js` -> `src/index`).
    pub fn path_without_extension(&self) -> &str {
        let path = self.entryfile_path.trim_start_matches("./");
        match path.rsplit_once('.') {
            Some((stem, ext)) if !ext.contains(['/', '\\']) => stem,
            _ => path,
        }
    }

    /// Dotted module path for the entry file (`src/app/main.py` -> `src.app.main`).
    pub fn module_path(&self) -> String {
        self.path_without_extension().replace(['/', '\\'], ".")
    }
}

/// Language-specific settings, one strongly typed variant per language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "language", rename_all = "lowercase")]
pub enum LanguageConfig {
    #[default]
    None,
    #[serde(alias = "typescript", alias = "js")]
    Javascript(JsConfig),
    Python(PythonConfig),
    Java(JavaConfig),
    Go(GoConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsPackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsConfig {
    #[serde(default)]
    pub package_manager: Option<JsPackageManager>,
    #[serde(default)]
    pub minify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PythonPackageManager {
    Pip,
    Poetry,
    Pipenv,
    Uv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PythonRunMode {
    Script,
    Asgi,
    Wsgi,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonConfig {
    #[serde(default)]
    pub package_manager: Option<PythonPackageManager>,
    #[serde(default)]
    pub minify: bool,
    #[serde(default)]
    pub run_app_as: Option<PythonRunMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JavaBuildTool {
    Gradle,
    Maven,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaConfig {
    #[serde(default)]
    pub use_maven: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoConfig {
    /// Extra `-ldflags` for `go build`
    #[serde(default)]
    pub ldflags: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entrypoint_with_handler() {
        let ep = EntryPoint::parse("main.py:handler");
        assert_eq!(ep.entryfile_path, "main.py");
        assert_eq!(ep.handler.as_deref(), Some("handler"));
    }

    #[test]
    fn test_entrypoint_without_handler() {
        let ep = EntryPoint::parse("main.py");
        assert_eq!(ep.entryfile_path, "main.py");
        assert_eq!(ep.handler, None);
    }

    #[test]
    fn test_entrypoint_windows_path() {
        let ep = EntryPoint::parse(r"C:\app\main.py");
        assert_eq!(ep.entryfile_path, r"C:\app\main.py");
        assert_eq!(ep.handler, None);
    }

    #[test]
    fn test_module_path() {
        let ep = EntryPoint::parse("src/app/main.py:app");
        assert_eq!(ep.module_path(), "src.app.main");
    }

    #[test]
    fn test_path_without_extension() {
        assert_eq!(EntryPoint::parse("./src/index.js").path_without_extension(), "src/index");
        assert_eq!(EntryPoint::parse("lib.v2/handler").path_without_extension(), "lib.v2/handler");
        assert_eq!(EntryPoint::parse("main.py:app").path_without_extension(), "main");
    }

    #[test]
    fn test_local_dependency_versions_are_unstable() {
        assert!(Dependency::new("requests", "2.31.0").has_stable_version());
        assert!(!Dependency::new("shared", "file:../shared").has_stable_version());
        assert!(!Dependency::new("lib", "../lib").has_stable_version());
        assert!(!Dependency {
            name: "unknown".into(),
            version: None
        }
        .has_stable_version());
    }

    #[test]
    fn test_workload_deserializes_from_camel_case() {
        let json = r#"{
            "name": "api",
            "packaging": { "kind": "custom-dockerfile", "buildContextPath": "./api",
                           "buildArgs": { "PORT": "3000" } },
            "platform": "linux/arm64",
            "existingDigests": ["abc"],
            "languageConfig": { "language": "python", "minify": true }
        }"#;
        let workload: Workload = serde_json::from_str(json).unwrap();
        assert_eq!(workload.packaging.kind_name(), "custom-dockerfile");
        assert_eq!(workload.platform.as_deref(), Some("linux/arm64"));
        assert_eq!(workload.existing_digests.len(), 1);
        assert!(matches!(
            workload.language_config,
            LanguageConfig::Python(PythonConfig { minify: true, .. })
        ));
    }
}
