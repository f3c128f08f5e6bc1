//! Filesystem utilities.
//!
//! Crash-tolerant writes for graph documents and settings files, plus
//! small JSON read helpers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Atomic Writes
// =============================================================================

/// Writes bytes through a sibling temp file and renames it into place.
///
/// Readers never observe a half-written document: either the old content or
/// the new content is present at `path`.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let staging = sibling_with_suffix(path, "tmp");
    {
        let mut writer = BufWriter::new(File::create(&staging)?);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    replace_with(path, &staging)
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Reads and deserializes a JSON document.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!("{file_name}.{suffix}"))
}

fn replace_with(dest: &Path, staging: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(staging, dest)?;
        return Ok(());
    }

    // Some filesystems refuse rename-over-existing; park the old file first.
    let parked = sibling_with_suffix(dest, "bak");
    if parked.exists() {
        let _ = std::fs::remove_file(&parked);
    }
    std::fs::rename(dest, &parked)?;

    if let Err(e) = std::fs::rename(staging, dest) {
        let _ = std::fs::rename(&parked, dest);
        let _ = std::fs::remove_file(staging);
        return Err(CoreError::IoError(e));
    }
    let _ = std::fs::remove_file(&parked);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("graph.ffgraph");

        atomic_write_bytes(&path, b"{}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(!sibling_with_suffix(&path, "tmp").exists());
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "old").unwrap();

        atomic_write_json_pretty(&path, &serde_json::json!({ "v": 2 })).unwrap();

        let value: serde_json::Value = read_json_file(&path).unwrap();
        assert_eq!(value["v"], 2);
        assert!(!sibling_with_suffix(&path, "bak").exists());
    }

    #[test]
    fn test_read_json_file_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result: CoreResult<serde_json::Value> = read_json_file(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(CoreError::IoError(_))));
    }
}
