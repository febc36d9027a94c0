//! Archive format inspection.
//!
//! The external tool imports plain tar and gzip-compressed tar archives.
//! Inspection reads only the first entry header, never the whole archive.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use wslkit_common::error::{Result, WslkitError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Detected archive format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Uncompressed tar.
    Tar,
    /// Gzip-compressed tar.
    TarGz,
    /// Anything else, including corrupt archives.
    Unknown,
}

/// Inspects the archive at `path` without blocking the async runtime.
///
/// # Errors
///
/// Returns an error only if the file cannot be opened.
pub async fn inspect(path: &Path) -> Result<ArchiveFormat> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || inspect_blocking(&owned))
        .await
        .map_err(|e| WslkitError::io(path, std::io::Error::other(e)))?
}

fn inspect_blocking(path: &Path) -> Result<ArchiveFormat> {
    let mut file = File::open(path).map_err(|e| WslkitError::io(path, e))?;
    let mut magic = [0u8; 2];
    let is_gzip = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| WslkitError::io(path, e))?;

    let format = if is_gzip {
        if has_tar_entry(flate2::read::GzDecoder::new(file)) {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Unknown
        }
    } else if has_tar_entry(file) {
        ArchiveFormat::Tar
    } else {
        ArchiveFormat::Unknown
    };
    tracing::debug!(path = %path.display(), ?format, "inspected archive");
    Ok(format)
}

fn has_tar_entry<R: Read>(reader: R) -> bool {
    let mut archive = tar::Archive::new(reader);
    archive
        .entries()
        .ok()
        .and_then(|mut entries| entries.next())
        .is_some_and(|entry| entry.is_ok())
}
