//! Crash-consistent file replacement.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{CoreError, CoreResult};

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a truncated one.
///
/// The bytes go to a sibling temp file that is fsynced and renamed into
/// place; the parent directory is fsynced afterwards so the rename itself
/// survives a crash.
pub fn write_atomic(path: &Path, contents: &[u8]) -> CoreResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CoreError::io(dir, e))?;
    tmp.write_all(contents).map_err(|e| CoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| CoreError::io(path, e.error))?;

    // Directory fsync is advisory on some filesystems.
    if let Ok(handle) = std::fs::File::open(dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.json");
        write_atomic(&path, b"{}").unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(&dir.path().join("a.json"), b"{}").unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
