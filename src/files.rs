//! File enumeration for the analysis pipeline.
//!
//! Walks the project tree, applies `.dacignore` globs plus a fixed set of
//! default excludes, and yields candidate source files in deterministic
//! (path-sorted) order.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IGNORE_RELATIVE_PATH;

/// A candidate source file yielded by the enumerator.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the project root, with `/` separators.
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Parse the project-local ignore file into glob patterns.
///
/// Blank lines and `#` comments are skipped. A missing file yields no
/// patterns.
pub fn parse_dacignore(project_root: &Path) -> Result<Vec<String>> {
    let path = project_root.join(IGNORE_RELATIVE_PATH);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Directories never worth summarizing, regardless of ignore file.
fn default_excludes() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/.dac/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
    ]
}

/// Walk the project tree and return candidate files, ignore rules applied,
/// sorted by relative path.
pub fn enumerate_files(project_root: &Path, ignore_patterns: &[String]) -> Result<Vec<SourceFile>> {
    if !project_root.exists() {
        bail!("project root does not exist: {}", project_root.display());
    }

    let mut patterns = default_excludes();
    patterns.extend(ignore_patterns.iter().cloned());
    let exclude_set = build_globset(&patterns)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(project_root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(project_root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        // A bare name pattern like "secrets.txt" should also match at any depth
        if exclude_set.is_match(relative.file_name().unwrap_or_default()) {
            continue;
        }

        files.push(SourceFile {
            rel_path: rel_str,
            abs_path: path.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// True if a path (relative to the project root) survives the ignore rules.
/// Used by the watcher to filter raw filesystem events.
pub fn is_candidate(project_root: &Path, path: &Path, ignore_patterns: &[String]) -> bool {
    let mut patterns = default_excludes();
    patterns.extend(ignore_patterns.iter().cloned());
    let Ok(exclude_set) = build_globset(&patterns) else {
        return false;
    };

    let relative = path.strip_prefix(project_root).unwrap_or(path);
    let rel_str = relative.to_string_lossy().replace('\\', "/");
    !exclude_set.is_match(&rel_str)
        && !exclude_set.is_match(relative.file_name().unwrap_or_default())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("invalid ignore pattern: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn enumerates_sorted_and_skips_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "b.py");
        touch(tmp.path(), "a.py");
        touch(tmp.path(), ".git/config");
        touch(tmp.path(), ".dac/index/dac.sqlite");
        touch(tmp.path(), "src/__pycache__/a.pyc");

        let files = enumerate_files(tmp.path(), &[]).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);
    }

    #[test]
    fn applies_ignore_patterns() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "main.py");
        touch(tmp.path(), "notes.md");
        touch(tmp.path(), "vendor/lib.py");

        let patterns = vec!["*.md".to_string(), "vendor/**".to_string()];
        let files = enumerate_files(tmp.path(), &patterns).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["main.py"]);
    }

    #[test]
    fn parses_ignore_file_with_comments() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join(".dacignore"),
            "# build output\n*.log\n\nvendor/**\n",
        )
        .unwrap();

        let patterns = parse_dacignore(tmp.path()).unwrap();
        assert_eq!(patterns, vec!["*.log", "vendor/**"]);
    }

    #[test]
    fn missing_ignore_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(parse_dacignore(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn candidate_filter_matches_enumeration() {
        let tmp = tempfile::tempdir().unwrap();
        let patterns = vec!["*.log".to_string()];
        assert!(is_candidate(
            tmp.path(),
            &tmp.path().join("src/main.rs"),
            &patterns
        ));
        assert!(!is_candidate(
            tmp.path(),
            &tmp.path().join("debug.log"),
            &patterns
        ));
        assert!(!is_candidate(
            tmp.path(),
            &tmp.path().join(".dac/docs/out.md"),
            &patterns
        ));
    }
}
