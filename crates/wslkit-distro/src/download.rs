//! Multi-stage template archive acquisition.
//!
//! Stages run in order and each one writes an importable archive to the
//! caller's staging path:
//!
//! 1. **Native install**: with elevated privileges, install the official
//!    distribution through the external tool, export it, and unregister the
//!    temporary instance.
//! 2. **Registry**: stream the importable URL advertised by the registry
//!    lookup, verifying the advertised checksum.
//! 3. **Mirror**: stream the template's source URL, or
//!    `<mirror>/<name>.tar.gz`, verifying the catalog's declared checksum.
//!
//! A failing stage removes its partial output and falls through to the next.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use wslkit_common::constants::{
    DEFAULT_DOWNLOAD_RETRIES, DEFAULT_SIZE_PROBE_TIMEOUT, DOWNLOAD_RETRY_DELAY,
};
use wslkit_common::error::{Result, WslkitError};
use wslkit_common::types::Sha256Hash;
use wslkit_core::wsl::WslTool;

use crate::hash;
use crate::http::{HttpClient, ProgressFn};
use crate::lookup::{RegistryEntry, RegistryLookup};

/// Stage that produced an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    /// Exported from a native install.
    NativeInstall,
    /// Downloaded from the registry's importable URL.
    Registry,
    /// Downloaded from the fallback mirror.
    Mirror,
}

impl std::fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NativeInstall => write!(f, "native-install"),
            Self::Registry => write!(f, "registry"),
            Self::Mirror => write!(f, "mirror"),
        }
    }
}

/// What to acquire and where to put it.
pub struct DownloadRequest<'a> {
    /// Template name.
    pub name: &'a str,
    /// Staging file written by the winning stage.
    pub dest: &'a Path,
    /// Catalog source URL, used by the mirror stage.
    pub source_url: Option<&'a str>,
    /// Catalog-declared digest, verified by the mirror stage.
    pub expected_sha256: Option<&'a Sha256Hash>,
    /// Progress callback for streamed stages.
    pub progress: &'a ProgressFn<'a>,
}

/// Result of a successful acquisition.
#[derive(Debug, Clone)]
pub struct AcquiredArchive {
    /// Staging file holding the archive.
    pub path: PathBuf,
    /// Stage that produced it.
    pub stage: DownloadStage,
    /// Registry metadata, when the lookup knew the name.
    pub registry_entry: Option<RegistryEntry>,
}

/// Ordered acquisition strategy.
pub struct DownloadFallbackChain {
    http: Arc<dyn HttpClient>,
    lookup: Option<Arc<dyn RegistryLookup>>,
    tool: Option<WslTool>,
    elevated: bool,
    mirror_base: Option<String>,
    retries: u32,
    retry_delay: Duration,
    probe_timeout: Duration,
}

impl std::fmt::Debug for DownloadFallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadFallbackChain")
            .field("has_lookup", &self.lookup.is_some())
            .field("tool", &self.tool)
            .field("elevated", &self.elevated)
            .field("mirror_base", &self.mirror_base)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl DownloadFallbackChain {
    /// Creates a chain with only the mirror stage enabled.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            lookup: None,
            tool: None,
            elevated: false,
            mirror_base: None,
            retries: DEFAULT_DOWNLOAD_RETRIES,
            retry_delay: DOWNLOAD_RETRY_DELAY,
            probe_timeout: DEFAULT_SIZE_PROBE_TIMEOUT,
        }
    }

    /// Enables the registry stage.
    #[must_use]
    pub fn with_lookup(mut self, lookup: Arc<dyn RegistryLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Enables the native-install stage when `elevated` is true.
    #[must_use]
    pub fn with_native_install(mut self, tool: WslTool, elevated: bool) -> Self {
        self.tool = Some(tool);
        self.elevated = elevated;
        self
    }

    /// Sets the base URL of the fallback mirror.
    #[must_use]
    pub fn with_mirror_base(mut self, base: impl Into<String>) -> Self {
        self.mirror_base = Some(base.into());
        self
    }

    /// Sets the number of attempts per URL (at least one).
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the base delay between attempts; attempt `n` waits `n * delay`.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the HEAD size-probe budget.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Acquires the archive for `request.name` into `request.dest`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadExhausted` wrapping the last failure when every
    /// applicable stage failed, or `NotFound` when no stage applied.
    pub async fn acquire(&self, request: &DownloadRequest<'_>) -> Result<AcquiredArchive> {
        let name = request.name;
        let mut last: Option<WslkitError> = None;

        let registry_entry = match &self.lookup {
            Some(lookup) => match lookup.find(name).await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(name, error = %e, "registry lookup failed");
                    last = Some(e);
                    None
                }
            },
            None => None,
        };
        let finish = |stage| AcquiredArchive {
            path: request.dest.to_path_buf(),
            stage,
            registry_entry: registry_entry.clone(),
        };

        if let (Some(tool), true) = (&self.tool, self.elevated) {
            tracing::info!(name, stage = %DownloadStage::NativeInstall, "trying download stage");
            match native_install(tool, name, request.dest).await {
                Ok(()) => return Ok(finish(DownloadStage::NativeInstall)),
                Err(e) => last = Some(stage_failed(DownloadStage::NativeInstall, request, e).await),
            }
        }

        let registry_url = registry_entry.as_ref().and_then(RegistryEntry::importable_url);
        if let Some(url) = registry_url {
            tracing::info!(name, stage = %DownloadStage::Registry, url, "trying download stage");
            let expected = registry_entry.as_ref().and_then(|e| e.sha256.as_ref());
            match self.fetch(url, request.dest, expected, request.progress).await {
                Ok(()) => return Ok(finish(DownloadStage::Registry)),
                Err(e) => last = Some(stage_failed(DownloadStage::Registry, request, e).await),
            }
        }

        let mirror_url = request.source_url.map(str::to_string).or_else(|| {
            self.mirror_base
                .as_deref()
                .map(|base| format!("{}/{name}.tar.gz", base.trim_end_matches('/')))
        });
        match mirror_url {
            Some(url) if registry_url == Some(url.as_str()) => {
                tracing::debug!(name, url, "mirror URL already attempted");
            }
            Some(url) => {
                tracing::info!(name, stage = %DownloadStage::Mirror, url, "trying download stage");
                match self
                    .fetch(&url, request.dest, request.expected_sha256, request.progress)
                    .await
                {
                    Ok(()) => return Ok(finish(DownloadStage::Mirror)),
                    Err(e) => last = Some(stage_failed(DownloadStage::Mirror, request, e).await),
                }
            }
            None => {}
        }

        match last {
            Some(cause) => Err(WslkitError::DownloadExhausted {
                name: name.to_string(),
                last: Box::new(cause),
            }),
            None => Err(WslkitError::NotFound {
                kind: "download source",
                id: name.to_string(),
            }),
        }
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected: Option<&Sha256Hash>,
        progress: &ProgressFn<'_>,
    ) -> Result<()> {
        match tokio::time::timeout(self.probe_timeout, self.http.content_length(url)).await {
            Ok(Ok(Some(bytes))) => tracing::info!(url, bytes, "remote archive size"),
            Ok(Ok(None)) => tracing::debug!(url, "server did not report a size"),
            Ok(Err(e)) => tracing::debug!(url, error = %e, "size probe failed"),
            Err(_) => tracing::debug!(url, "size probe timed out"),
        }

        let attempts = self.retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.http.download(url, dest, progress).await {
                Ok(bytes) => {
                    tracing::debug!(url, bytes, attempt, "download finished");
                    break;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(url, attempt, error = %e, "download attempt failed, retrying");
                    discard(dest).await;
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(expected) = expected {
            hash::validate_hash(dest, expected).await?;
        }
        Ok(())
    }
}

async fn stage_failed(
    stage: DownloadStage,
    request: &DownloadRequest<'_>,
    error: WslkitError,
) -> WslkitError {
    tracing::warn!(name = request.name, %stage, error = %error, "download stage failed");
    discard(request.dest).await;
    error
}

async fn native_install(tool: &WslTool, name: &str, dest: &Path) -> Result<()> {
    let created = tool.find(name).await?.is_none();
    if created {
        tool.install(name).await?;
    } else {
        tracing::debug!(name, "already registered, skipping install");
    }
    let exported = tool.export(name, dest).await;
    if created {
        if let Err(e) = tool.unregister(name).await {
            tracing::warn!(name, error = %e, "failed to remove temporary install");
        }
    }
    exported
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove partial download"),
    }
}
