//! Global configuration model for wslkit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, WslkitError};
use crate::layout::StorageLayout;

/// Root configuration for wslkit.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WslkitConfig {
    /// Base directory for the catalog, archives, manifests and registry.
    pub data_dir: PathBuf,
    /// External tool executable.
    pub tool_binary: String,
    /// Timeout in seconds for short tool invocations.
    pub tool_timeout_secs: u64,
    /// Timeout in seconds for import/export/install invocations.
    pub import_timeout_secs: u64,
    /// Attempts per download URL.
    pub download_retries: u32,
    /// Timeout in seconds for the HEAD size probe.
    pub size_probe_timeout_secs: u64,
    /// Official distribution index URL.
    pub registry_url: String,
    /// Base URL of the fallback mirror (`<base>/<name>.tar.gz`).
    pub mirror_base_url: Option<String>,
    /// Whether offline mode is enabled (no registry refresh, no downloads).
    pub offline: bool,
    /// Recorded as `created_by` in manifests and the image registry.
    pub created_by: String,
}

impl Default for WslkitConfig {
    fn default() -> Self {
        Self {
            data_dir: constants::data_dir().clone(),
            tool_binary: constants::WSL_BINARY.to_string(),
            tool_timeout_secs: constants::DEFAULT_TOOL_TIMEOUT.as_secs(),
            import_timeout_secs: constants::DEFAULT_IMPORT_TIMEOUT.as_secs(),
            download_retries: constants::DEFAULT_DOWNLOAD_RETRIES,
            size_probe_timeout_secs: constants::DEFAULT_SIZE_PROBE_TIMEOUT.as_secs(),
            registry_url: constants::DISTRIBUTION_INFO_URL.to_string(),
            mirror_base_url: None,
            offline: false,
            created_by: format!("{}/{}", constants::APP_NAME, env!("CARGO_PKG_VERSION")),
        }
    }
}

impl WslkitConfig {
    /// Loads a configuration file, filling unspecified keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WslkitError::io(path, e))?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Returns the storage layout rooted at [`Self::data_dir`].
    #[must_use]
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.data_dir.clone())
    }

    /// Timeout for short tool invocations.
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Timeout for import/export/install invocations.
    #[must_use]
    pub const fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }

    /// Timeout for the download size probe.
    #[must_use]
    pub const fn size_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.size_probe_timeout_secs)
    }
}
