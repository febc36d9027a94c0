//! Durable file writes shared by the JSON stores.

use std::io::Write;
use std::path::Path;

use crate::error::{Result, WslkitError};

/// Writes `bytes` to `path` atomically.
///
/// The data goes to a temporary file in the same directory, is flushed to
/// disk, and is then renamed over `path`, so readers never observe a
/// partially written document. Missing parent directories are created.
///
/// # Errors
///
/// Returns an error if the directory, temporary file, or rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| WslkitError::io(parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| WslkitError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| WslkitError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| WslkitError::io(tmp.path(), e))?;
    let _ = tmp
        .persist(path)
        .map_err(|e| WslkitError::io(path, e.error))?;
    Ok(())
}
