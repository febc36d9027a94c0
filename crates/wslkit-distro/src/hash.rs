//! SHA-256 content verification.
//!
//! Archives can be several gigabytes, so files are always streamed through
//! the hasher in fixed-size chunks.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use wslkit_common::constants::HASH_CHUNK_SIZE;
use wslkit_common::error::{Result, WslkitError};
use wslkit_common::types::Sha256Hash;

/// Computes the SHA-256 hash of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn hash_file(path: &Path) -> Result<Sha256Hash> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| WslkitError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| WslkitError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Sha256Hash::from_hex(format!("{:x}", hasher.finalize()))
}

/// Best-effort integrity check.
///
/// Returns `true` when there is nothing to check, `false` when the file is
/// missing while a hash is expected or when reading fails, and otherwise
/// whether the digests match.
pub async fn verify(path: &Path, expected: Option<&Sha256Hash>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return false;
    }
    match hash_file(path).await {
        Ok(actual) => actual == *expected,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "hash verification failed to read file");
            false
        }
    }
}

/// Validates that a file matches the expected SHA-256 hash.
///
/// # Errors
///
/// Returns `WslkitError::IntegrityMismatch` if the hashes do not match, or an
/// I/O error if the file cannot be read.
pub async fn validate_hash(path: &Path, expected: &Sha256Hash) -> Result<()> {
    tracing::debug!(path = %path.display(), "validating SHA-256 hash");
    let actual = hash_file(path).await?;
    if actual != *expected {
        return Err(WslkitError::IntegrityMismatch {
            resource: path.display().to_string(),
            expected: expected.as_hex().to_string(),
            actual: actual.as_hex().to_string(),
        });
    }
    Ok(())
}
