//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable that overrides the data directory.
pub const HOME_ENV: &str = "WSLKIT_HOME";

/// Fallback data directory when no home directory can be determined.
pub const FALLBACK_DATA_DIR: &str = ".wslkit";

/// Returns the data directory, preferring `$WSLKIT_HOME`, then
/// `$HOME/.wslkit` (or `%USERPROFILE%\.wslkit`), falling back to a
/// relative `.wslkit` directory.
fn resolve_data_dir() -> PathBuf {
    if let Ok(explicit) = std::env::var(HOME_ENV) {
        if !explicit.is_empty() {
            return PathBuf::from(explicit);
        }
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".wslkit");
    }
    PathBuf::from(FALLBACK_DATA_DIR)
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Directory (under the root) holding the catalog and template archives.
pub const DISTROS_DIR: &str = "distros";
/// Catalog file name inside [`DISTROS_DIR`].
pub const CATALOG_FILE: &str = "catalog.json";
/// Extension of managed template archives.
pub const ARCHIVE_EXTENSION: &str = "tar";
/// Directory (under the root) holding image metadata.
pub const IMAGES_DIR: &str = "images";
/// Manifest directory inside [`IMAGES_DIR`].
pub const MANIFESTS_DIR: &str = "manifests";
/// Default install directory parent inside [`IMAGES_DIR`].
pub const INSTANCES_DIR: &str = "instances";
/// Image registry file name inside [`IMAGES_DIR`].
pub const IMAGE_REGISTRY_FILE: &str = "images.json";
/// Scratch directory (under the root) for ephemeral exports.
pub const TMP_DIR: &str = "tmp";

/// Current catalog schema version.
pub const CATALOG_SCHEMA_VERSION: u32 = 1;
/// Current manifest schema version.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Name of the external virtualization tool.
pub const WSL_BINARY: &str = "wsl.exe";

/// Timeout for short tool invocations (list, unregister, version).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for import/export/install invocations (large archives).
pub const DEFAULT_IMPORT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Number of attempts per download URL.
pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 3;
/// Base delay between download attempts (multiplied by the attempt number).
pub const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Timeout for the HEAD request probing an archive's size.
pub const DEFAULT_SIZE_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Chunk size used when streaming files through SHA-256.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Official distribution index consulted by the registry lookup.
pub const DISTRIBUTION_INFO_URL: &str =
    "https://raw.githubusercontent.com/microsoft/WSL/master/distributions/DistributionInfo.json";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Maximum length of template and image names.
pub const MAX_NAME_LENGTH: usize = 64;

/// Application name used in logs and manifests.
pub const APP_NAME: &str = "wslkit";


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_stable_for_the_session() {
        assert_eq!(data_dir(), data_dir());
    }

    #[test]
    fn import_timeout_exceeds_short_timeout() {
        assert!(DEFAULT_IMPORT_TIMEOUT > DEFAULT_TOOL_TIMEOUT);
    }
}
