//! Build context packing.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};

/// Tar `dir` for the build endpoint, skipping `.git` and `.dockerignore`
/// matches.
pub fn build_context(dir: &Path) -> EngineResult<Vec<u8>> {
    let ignore = IgnoreList::load(dir);
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    let walker = WalkDir::new(dir).min_depth(1).into_iter().filter_entry(|entry| {
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        !(rel == Path::new(".git") || ignore.matches(rel))
    });

    let mut files = 0usize;
    for entry in walker {
        let entry = entry.map_err(|e| EngineError::Stream(format!("walking build context: {e}")))?;
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if entry.file_type().is_dir() {
            builder.append_dir(rel, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), rel)?;
            files += 1;
        }
    }

    let bytes = builder.into_inner()?;
    debug!(dir = %dir.display(), files, bytes = bytes.len(), "packed build context");
    Ok(bytes)
}

/// Patterns from `.dockerignore`.
///
/// Supports `*` and `?` within a path, and a pattern with no slash also
/// matches any single path component.
#[derive(Debug, Default)]
pub struct IgnoreList {
    patterns: Vec<String>,
}

impl IgnoreList {
    pub fn load(dir: &Path) -> Self {
        let contents = std::fs::read_to_string(dir.join(".dockerignore")).unwrap_or_default();
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Self {
        let patterns = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
            .map(|l| l.trim_start_matches("./").trim_end_matches('/').to_string())
            .filter(|l| !l.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, rel: &Path) -> bool {
        let path = rel.to_string_lossy().replace('\\', "/");
        self.patterns.iter().any(|pattern| {
            glob_match(pattern, &path)
                || (!pattern.contains('/')
                    && rel
                        .components()
                        .any(|c| glob_match(pattern, &c.as_os_str().to_string_lossy())))
        })
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && t[0] != b'/' && inner(p, &t[1..])),
            (Some(b'?'), Some(c)) if *c != b'/' => inner(&p[1..], &t[1..]),
            (Some(a), Some(b)) if a == b => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn glob_basics() {
        assert!(glob_match("*.log", "debug.log"));
        assert!(!glob_match("*.log", "logs/debug.log"));
        assert!(glob_match("logs/*.log", "logs/debug.log"));
        assert!(glob_match("file?.txt", "file1.txt"));
        assert!(!glob_match("file?.txt", "file10.txt"));
    }

    #[test]
    fn ignore_list_parsing() {
        let list = IgnoreList::parse("# comment\nnode_modules/\n\n./target\n*.log\n!keep.log\n");
        assert!(list.matches(Path::new("node_modules")));
        assert!(list.matches(Path::new("target")));
        assert!(list.matches(Path::new("src/trace.log")));
        assert!(!list.matches(Path::new("src/main.rs")));
    }

    #[test]
    fn context_skips_git_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Dockerfile"), "FROM alpine\n").unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/app.js"), "console.log(1)").unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref: main").unwrap();
        fs::create_dir_all(root.join("node_modules/x")).unwrap();
        fs::write(root.join("node_modules/x/index.js"), "").unwrap();
        fs::write(root.join(".dockerignore"), "node_modules\n").unwrap();

        let bytes = build_context(root).unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec![".dockerignore", "Dockerfile", "src", "src/app.js"]);
    }
}
