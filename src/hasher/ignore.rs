use crate::constants::{DEFAULT_EXCLUDE_GLOBS, VCS_EXCLUDE_GLOBS};
use glob::Pattern;
use std::path::Path;

/// Exclude globs applied to checksums, bundles and archives
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    patterns: Vec<Pattern>,
}

impl ExcludeRules {
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Build output folders, VCS metadata and coverage reports.
    pub fn defaults() -> Self {
        Self::from_globs(DEFAULT_EXCLUDE_GLOBS.iter().copied())
    }

    /// Version-control metadata only.
    pub fn vcs() -> Self {
        Self::from_globs(VCS_EXCLUDE_GLOBS.iter().copied())
    }

    /// Invalid globs are dropped rather than failing the whole build.
    pub fn from_globs<I, S>(globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = globs
            .into_iter()
            .map(|g| g.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|g| !g.is_empty() && !g.starts_with('#'))
            .filter_map(|g| Pattern::new(&g).ok())
            .collect();
        Self { patterns }
    }

    /// Parse rules from `.dockerignore`-style content.
    pub fn parse(content: &str) -> Self {
        Self::from_globs(content.lines())
    }

    /// Load rules from a file next to the sources; a missing file means no rules.
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::empty(),
        }
    }

    pub fn extend(mut self, other: &ExcludeRules) -> Self {
        self.patterns.extend(other.patterns.iter().cloned());
        self
    }

    /// Glob strings, in insertion order. These feed the digest of strategies
    /// whose output depends on what is excluded.
    pub fn globs(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Returns true if the given path (relative to the source root) should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        // Check the path itself and all its parents
        for ancestor in path.ancestors() {
            let path_str = ancestor.to_string_lossy().replace('\\', "/");
            if path_str.is_empty() || path_str == "." {
                continue;
            }
            let file_name = ancestor
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            for pattern in &self.patterns {
                if pattern.matches(&path_str) || pattern.matches(&file_name) {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let rules = ExcludeRules::parse("node_modules\n.git");
        assert!(rules.is_excluded(Path::new("node_modules")));
        assert!(rules.is_excluded(Path::new(".git/HEAD")));
        assert!(!rules.is_excluded(Path::new("src")));
    }

    #[test]
    fn test_wildcard() {
        let rules = ExcludeRules::parse("*.log");
        assert!(rules.is_excluded(Path::new("build.log")));
        assert!(rules.is_excluded(Path::new("logs/app.log")));
        assert!(!rules.is_excluded(Path::new("main.rs")));
    }

    #[test]
    fn test_nested_directory_name() {
        let rules = ExcludeRules::defaults();
        assert!(rules.is_excluded(Path::new("pkg/__pycache__/mod.cpython-312.pyc")));
        assert!(rules.is_excluded(Path::new("coverage/lcov.info")));
        assert!(!rules.is_excluded(Path::new("src/handler.py")));
    }

    #[test]
    fn test_vcs_rules_keep_build_output() {
        let rules = ExcludeRules::vcs();
        assert!(rules.is_excluded(Path::new(".git/HEAD")));
        assert!(!rules.is_excluded(Path::new("coverage/__init__.py")));
        assert!(!rules.is_excluded(Path::new(".next/BUILD_ID")));
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let rules = ExcludeRules::parse("# comment\n\ndist/\n");
        assert_eq!(rules.globs(), vec!["dist".to_string()]);
    }
}
