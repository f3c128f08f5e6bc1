//! Wildcard path resolution
//!
//! The expander only needs `pattern -> ordered paths`; [`PathResolver`] is
//! that seam. [`GlobPathResolver`] answers it from the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::core::{CoreError, CoreResult};

/// Resolves a wildcard pattern to concrete paths
#[async_trait]
pub trait PathResolver: Send + Sync {
    /// Returns matching paths in a stable order. No match is an empty list.
    async fn resolve(&self, pattern: &str) -> CoreResult<Vec<String>>;
}

/// Filesystem resolver backed by `globset` and `walkdir`
#[derive(Debug, Clone, Default)]
pub struct GlobPathResolver {
    /// Directory relative patterns are resolved against; process cwd if unset
    base_dir: Option<PathBuf>,
}

impl GlobPathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl PathResolver for GlobPathResolver {
    async fn resolve(&self, pattern: &str) -> CoreResult<Vec<String>> {
        let pattern = pattern.to_string();
        let base = self.base_dir.clone();
        tokio::task::spawn_blocking(move || resolve_blocking(base.as_deref(), &pattern))
            .await
            .map_err(|e| CoreError::Internal(format!("glob task failed: {e}")))?
    }
}

fn is_glob_segment(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}

/// Walks the pattern's literal directory prefix and keeps matching files.
///
/// Returned paths keep the form of the pattern: relative patterns yield
/// relative paths.
fn resolve_blocking(base: Option<&Path>, pattern: &str) -> CoreResult<Vec<String>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| CoreError::InvalidGlob {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?
        .compile_matcher();

    let segments: Vec<&str> = pattern.split('/').collect();
    let literal_len = segments
        .iter()
        .position(|s| is_glob_segment(s))
        .unwrap_or(segments.len().saturating_sub(1));
    let prefix = segments[..literal_len].join("/");
    let recursive = segments[literal_len..].iter().any(|s| s.contains("**"));
    let depth = segments.len() - literal_len;

    let display_root = if literal_len == 0 {
        PathBuf::new()
    } else if prefix.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(&prefix)
    };
    let walk_root = match base {
        Some(base) if display_root.is_relative() => base.join(&display_root),
        _ if display_root.as_os_str().is_empty() => PathBuf::from("."),
        _ => display_root.clone(),
    };

    if !walk_root.is_dir() {
        tracing::debug!(root = %walk_root.display(), pattern, "wildcard root does not exist");
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(&walk_root).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(depth);
    }

    let mut matches = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&walk_root) else {
            continue;
        };
        let candidate = display_root.join(relative);
        if matcher.is_match(&candidate) {
            matches.push(candidate.to_string_lossy().to_string());
        }
    }

    matches.sort();
    tracing::debug!(pattern, count = matches.len(), "resolved wildcard");
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
    }

    #[tokio::test]
    async fn test_resolves_relative_pattern_sorted() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "clip2.mp4");
        touch(dir.path(), "clip1.mp4");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "sub/clip3.mp4");

        let resolver = GlobPathResolver::new().with_base_dir(dir.path());
        let paths = resolver.resolve("clip*.mp4").await.unwrap();
        assert_eq!(paths, vec!["clip1.mp4", "clip2.mp4"]);
    }

    #[tokio::test]
    async fn test_resolves_absolute_and_recursive_patterns() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a/one.mov");
        touch(dir.path(), "a/b/two.mov");
        touch(dir.path(), "a/b/skip.mp4");

        let root = dir.path().to_string_lossy().to_string();
        let resolver = GlobPathResolver::new();
        let paths = resolver.resolve(&format!("{root}/a/**/*.mov")).await.unwrap();
        assert_eq!(
            paths,
            vec![format!("{root}/a/b/two.mov"), format!("{root}/a/one.mov")]
        );
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let resolver = GlobPathResolver::new().with_base_dir(dir.path());
        assert!(resolver.resolve("nope/*.mp4").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_glob_is_error() {
        let resolver = GlobPathResolver::new();
        let err = resolver.resolve("clips/[a-.mp4").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidGlob { .. }));
    }
}
