//! Source enumeration: the deduplicated set of `.java` units for one run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::{CallGraphError, CgResult};

const SOURCE_EXTENSION: &str = "java";

/// Build output and tool state that never holds hand-written sources.
const IMPLICIT_IGNORED_DIRS: &[&str] = &[
    ".git",
    ".gradle",
    ".idea",
    "build",
    "target",
    "out",
    "bin",
    "generated",
    "generated-sources",
    "node_modules",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Relative to the scanned root, `/`-separated.
    pub path: PathBuf,
    pub content: String,
    pub digest: String,
}

/// The ordered, content-deduplicated sources of one analysis.
#[derive(Debug, Clone, Default)]
pub struct SourceModel {
    root: PathBuf,
    files: Vec<SourceFile>,
    files_seen: usize,
}

pub fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn compile_patterns(patterns: &[String]) -> CgResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| Regex::new(p).map_err(CallGraphError::from))
        .collect()
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

impl SourceModel {
    /// Walk `root`, honoring `.gitignore`, keeping `.java` files whose
    /// relative path matches some `include` pattern (all when empty) and no
    /// `exclude` pattern. Identical contents are kept once, first path wins.
    pub fn scan(root: &Path, include: &[String], exclude: &[String]) -> CgResult<Self> {
        if !root.is_dir() {
            return Err(CallGraphError::SourceRootMissing(root.display().to_string()));
        }
        let include = compile_patterns(include)?;
        let exclude = compile_patterns(exclude)?;

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .git_global(false)
            .require_git(false)
            .follow_links(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                let name = entry.file_name().to_string_lossy();
                !(is_dir && entry.depth() > 0 && IMPLICIT_IGNORED_DIRS.contains(&&*name))
            });

        let mut candidates = Vec::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let is_source = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(SOURCE_EXTENSION));
            if !is_source {
                continue;
            }
            let rel = relative_path(root, entry.path());
            if !include.is_empty() && !include.iter().any(|re| re.is_match(&rel)) {
                continue;
            }
            if exclude.iter().any(|re| re.is_match(&rel)) {
                continue;
            }
            candidates.push((rel, entry.into_path()));
        }

        let mut loaded = Vec::with_capacity(candidates.len());
        for (rel, absolute) in candidates {
            match std::fs::read(&absolute) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes).into_owned();
                    loaded.push((PathBuf::from(rel), content));
                }
                Err(err) => warn!(file = %absolute.display(), error = %err, "failed to read source"),
            }
        }

        let model = SourceModel::from_sources(root, loaded);
        if model.files.is_empty() {
            return Err(CallGraphError::NoSourceFiles(root.display().to_string()));
        }
        Ok(model)
    }

    /// In-memory construction; paths are taken as given.
    pub fn from_sources<P, S>(root: &Path, sources: impl IntoIterator<Item = (P, S)>) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let mut files_seen = 0;
        for (path, content) in sources {
            files_seen += 1;
            let path = path.into();
            let content = content.into();
            let digest = compute_content_hash(content.as_bytes());
            if !seen.insert(digest.clone()) {
                debug!(file = %path.display(), "duplicate content skipped");
                continue;
            }
            files.push(SourceFile { path, content, digest });
        }
        SourceModel {
            root: root.to_path_buf(),
            files,
            files_seen,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Candidate files before deduplication.
    pub fn files_seen(&self) -> usize {
        self.files_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn paths(model: &SourceModel) -> Vec<String> {
        model
            .files()
            .iter()
            .map(|f| f.path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_scan_keeps_java_and_skips_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a/A.java", "package a; class A {}");
        write(dir.path(), "src/a/notes.txt", "hello");
        write(dir.path(), "build/gen/G.java", "class G {}");
        write(dir.path(), "target/T.java", "class T {}");

        let model = SourceModel::scan(dir.path(), &[], &[]).unwrap();
        assert_eq!(paths(&model), vec!["src/a/A.java"]);
    }

    #[test]
    fn test_scan_deduplicates_by_content() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/A.java", "package a; class A {}");
        write(dir.path(), "b/A.java", "package a; class A {}");
        write(dir.path(), "b/B.java", "package b; class B {}");

        let model = SourceModel::scan(dir.path(), &[], &[]).unwrap();
        assert_eq!(paths(&model), vec!["a/A.java", "b/B.java"]);
        assert_eq!(model.files_seen(), 3);
    }

    #[test]
    fn test_scan_applies_include_and_exclude() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main/A.java", "class A {}");
        write(dir.path(), "main/ATest.java", "class ATest {}");
        write(dir.path(), "other/B.java", "class B {}");

        let model = SourceModel::scan(
            dir.path(),
            &["^main/".to_string()],
            &["Test\\.java$".to_string()],
        )
        .unwrap();
        assert_eq!(paths(&model), vec!["main/A.java"]);
    }

    #[test]
    fn test_scan_honors_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "legacy/\n");
        write(dir.path(), "legacy/Old.java", "class Old {}");
        write(dir.path(), "New.java", "class New {}");

        let model = SourceModel::scan(dir.path(), &[], &[]).unwrap();
        assert_eq!(paths(&model), vec!["New.java"]);
    }

    #[test]
    fn test_scan_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            SourceModel::scan(&missing, &[], &[]),
            Err(CallGraphError::SourceRootMissing(_))
        ));
        write(dir.path(), "README.md", "none");
        assert!(matches!(
            SourceModel::scan(dir.path(), &[], &[]),
            Err(CallGraphError::NoSourceFiles(_))
        ));
        assert!(matches!(
            SourceModel::scan(dir.path(), &["(".to_string()], &[]),
            Err(CallGraphError::Regex(_))
        ));
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            compute_content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
