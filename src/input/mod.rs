//! Input resolution: command-line arguments to an ordered list of scripts
//!
//! Architectural Principle: Service Layer - PathResolver owns every rule for turning arguments into files
//! - Files pass through, directories are walked, wildcard arguments are glob-expanded
//! - Exclude patterns follow .gitignore conventions, with `!` re-including a path
//! - Missing paths are kept so the analyzer reports them instead of silently dropping them

use crate::config::PathConfig;
use crate::domain::violations::{LintError, LintResult};
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A single exclude pattern
#[derive(Debug, Clone)]
struct ExcludePattern {
    pattern: Pattern,
    /// `!pattern`: re-include what an earlier pattern excluded
    is_include: bool,
    original: String,
}

impl ExcludePattern {
    fn parse(raw: &str) -> LintResult<Self> {
        let (is_include, original) = match raw.strip_prefix('!') {
            Some(stripped) => (true, stripped.to_string()),
            None => (false, raw.to_string()),
        };
        let pattern = Pattern::new(original.trim_start_matches('/'))
            .map_err(|e| LintError::config(format!("Invalid exclude pattern '{raw}': {e}")))?;

        Ok(Self {
            pattern,
            is_include,
            original,
        })
    }

    /// Patterns with a slash match the whole path, others only the file name
    fn matches(&self, path: &Path) -> bool {
        if self.original.contains('/') {
            let normalized = path.to_string_lossy().replace('\\', "/");
            let normalized = normalized.trim_start_matches("./");
            return self.pattern.matches(normalized);
        }
        path.file_name()
            .is_some_and(|name| self.pattern.matches(&name.to_string_lossy()))
    }
}

/// Resolves input arguments into script paths
#[derive(Debug, Clone)]
pub struct PathResolver {
    include: Vec<Pattern>,
    exclude: Vec<ExcludePattern>,
}

impl PathResolver {
    pub fn new(include: &[String], exclude: &[String]) -> LintResult<Self> {
        let include = include
            .iter()
            .map(|raw| {
                Pattern::new(raw)
                    .map_err(|e| LintError::config(format!("Invalid include pattern '{raw}': {e}")))
            })
            .collect::<LintResult<Vec<_>>>()?;
        let exclude = exclude
            .iter()
            .map(|raw| ExcludePattern::parse(raw))
            .collect::<LintResult<Vec<_>>>()?;

        Ok(Self { include, exclude })
    }

    pub fn from_config(paths: &PathConfig) -> LintResult<Self> {
        Self::new(&paths.include, &paths.exclude)
    }

    /// Resolve arguments in order, dropping duplicates after their first occurrence
    pub fn resolve(&self, arguments: &[String]) -> LintResult<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for argument in arguments {
            for path in self.resolve_one(argument)? {
                if seen.insert(path.clone()) {
                    resolved.push(path);
                }
            }
        }

        tracing::debug!("Resolved {} input argument(s) to {} script(s)", arguments.len(), resolved.len());
        Ok(resolved)
    }

    fn resolve_one(&self, argument: &str) -> LintResult<Vec<PathBuf>> {
        let path = Path::new(argument);

        if path.is_file() {
            return Ok(if self.is_excluded(path) {
                Vec::new()
            } else {
                vec![path.to_path_buf()]
            });
        }
        if path.is_dir() {
            return Ok(self.walk(path));
        }
        if is_wildcard(argument) {
            return self.expand(argument);
        }

        // Reported as an io-error when the analyzer tries to read it
        Ok(vec![path.to_path_buf()])
    }

    fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_file() && self.is_included(path) && !self.is_excluded(path) {
                files.push(path.to_path_buf());
            }
        }

        files
    }

    fn expand(&self, argument: &str) -> LintResult<Vec<PathBuf>> {
        let entries = glob::glob(argument)
            .map_err(|e| LintError::config(format!("Invalid input pattern '{argument}': {e}")))?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() && !self.is_excluded(&path) => files.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable match for '{}': {}", argument, e),
            }
        }

        if files.is_empty() {
            tracing::warn!("Input pattern '{}' matched no scripts", argument);
        }
        Ok(files)
    }

    /// Whether a walked file has a script extension
    pub fn is_included(&self, path: &Path) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        path.file_name().is_some_and(|name| {
            let name = name.to_string_lossy();
            self.include.iter().any(|pattern| pattern.matches_with(&name, options))
        })
    }

    /// Apply exclude patterns in order; the last matching one decides
    pub fn is_excluded(&self, path: &Path) -> bool {
        let mut excluded = false;
        for pattern in &self.exclude {
            if pattern.matches(path) {
                excluded = !pattern.is_include;
            }
        }
        excluded
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self {
            include: Pattern::new("*.sql").into_iter().collect(),
            exclude: Vec::new(),
        }
    }
}

fn is_wildcard(argument: &str) -> bool {
    argument.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("procs/generated")).unwrap();
        fs::write(root.join("b.sql"), "SELECT 1;").unwrap();
        fs::write(root.join("a.SQL"), "SELECT 1;").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();
        fs::write(root.join("procs/p.sql"), "SELECT 1;").unwrap();
        fs::write(root.join("procs/generated/g.sql"), "SELECT 1;").unwrap();
        dir
    }

    fn arg(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_directory_walk_is_sorted_and_filtered() {
        let dir = tree();
        let resolver = PathResolver::new(&["*.sql".to_string()], &[]).unwrap();

        let files = resolver.resolve(&[arg(dir.path())]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.SQL", "b.sql", "procs/generated/g.sql", "procs/p.sql"]);
    }

    #[test]
    fn test_exclude_patterns_with_reinclude() {
        let dir = tree();
        let resolver = PathResolver::new(
            &["*.sql".to_string()],
            &["**/generated/**".to_string(), "b.sql".to_string(), "!b.sql".to_string()],
        )
        .unwrap();

        let files = resolver.resolve(&[arg(dir.path())]).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| !p.to_string_lossy().contains("generated")));
        assert!(files.iter().any(|p| p.ends_with("b.sql")));
    }

    #[test]
    fn test_files_globs_and_missing_paths() {
        let dir = tree();
        let resolver = PathResolver::default();
        let missing = dir.path().join("missing.sql");

        let files = resolver
            .resolve(&[
                arg(&dir.path().join("notes.txt")),
                arg(&dir.path().join("procs/*.sql")),
                arg(&missing),
            ])
            .unwrap();

        assert_eq!(
            files,
            vec![dir.path().join("notes.txt"), dir.path().join("procs/p.sql"), missing]
        );
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let dir = tree();
        let resolver = PathResolver::default();
        let b = arg(&dir.path().join("b.sql"));

        let files = resolver.resolve(&[b.clone(), arg(dir.path()), b]).unwrap();
        assert_eq!(files[0], dir.path().join("b.sql"));
        assert_eq!(files.len(), 4);
    }

    #[test]
    fn test_invalid_patterns_are_configuration_errors() {
        assert!(PathResolver::new(&["[".to_string()], &[]).is_err());
        assert!(PathResolver::new(&[], &["[invalid".to_string()]).is_err());
    }
}
