//! Template catalog operations.
//!
//! Every catalog mutation runs inside [`CatalogStore::with_lock`] and is
//! persisted before the lock is released. Slow work (copying, hashing,
//! downloading, fetching the registry) happens outside the lock against a
//! staging file, and only the final rename and record update are serialized.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tempfile::TempPath;
use wslkit_common::error::{Result, WslkitError};
use wslkit_common::layout::StorageLayout;
use wslkit_common::types::{Sha256Hash, validate_name};

use crate::archive::{self, ArchiveFormat};
use crate::download::{DownloadFallbackChain, DownloadRequest};
use crate::hash;
use crate::http::ProgressFn;
use crate::lookup::{RegistryEntry, RegistryLookup};
use crate::store::CatalogStore;
use crate::template::{Catalog, Template, TemplateOrigin};

/// Aggregate disk usage of the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Number of catalog entries.
    pub total_templates: usize,
    /// Entries whose archive is present locally.
    pub downloaded_templates: usize,
    /// Sum of declared sizes across all entries.
    pub declared_bytes: u64,
    /// Sum of the on-disk sizes of present archives.
    pub downloaded_bytes: u64,
}

/// Catalog CRUD, availability, verification and downloads.
pub struct DistroCatalogManager {
    layout: StorageLayout,
    store: CatalogStore,
    lookup: Option<Arc<dyn RegistryLookup>>,
    downloader: Option<DownloadFallbackChain>,
    offline: bool,
}

impl std::fmt::Debug for DistroCatalogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistroCatalogManager")
            .field("layout", &self.layout)
            .field("store", &self.store)
            .field("has_lookup", &self.lookup.is_some())
            .field("downloader", &self.downloader)
            .field("offline", &self.offline)
            .finish()
    }
}

impl DistroCatalogManager {
    /// Opens the catalog under `layout`, seeding it with `seed` on first run.
    pub async fn open(layout: StorageLayout, seed: Vec<Template>) -> Self {
        let store = CatalogStore::new(layout.catalog_file(), seed);
        store.load().await;
        Self {
            layout,
            store,
            lookup: None,
            downloader: None,
            offline: false,
        }
    }

    /// Refreshes the catalog from `lookup` on every listing.
    #[must_use]
    pub fn with_registry(mut self, lookup: Arc<dyn RegistryLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Enables [`Self::ensure_available`].
    #[must_use]
    pub fn with_downloader(mut self, chain: DownloadFallbackChain) -> Self {
        self.downloader = Some(chain);
        self
    }

    /// Disables registry refreshes and downloads.
    #[must_use]
    pub const fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Storage layout in use.
    #[must_use]
    pub const fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Lists all templates, refreshing from the registry when configured.
    ///
    /// Refresh failures are logged and the cached catalog is served.
    pub async fn list(&self) -> Vec<Template> {
        if let (Some(lookup), false) = (&self.lookup, self.offline) {
            match lookup.list().await {
                Ok(entries) => {
                    let merged = self
                        .store
                        .with_lock(|| async {
                            let changed = self.store.modify(|c| merge_registry(c, &entries));
                            self.store.save().await?;
                            Ok::<_, WslkitError>(changed)
                        })
                        .await;
                    match merged {
                        Ok(changed) => tracing::debug!(changed, "catalog refreshed from registry"),
                        Err(e) => tracing::warn!(error = %e, "failed to persist registry refresh"),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "registry refresh failed, serving cached catalog"),
            }
        }
        let mut catalog = self.store.snapshot();
        catalog.refresh_availability().await;
        catalog.distributions
    }

    /// Returns the template named `name`.
    pub async fn get(&self, name: &str) -> Option<Template> {
        let mut template = self.store.snapshot().get(name).cloned()?;
        template.refresh_availability().await;
        Some(template)
    }

    /// Imports the archive at `local_file` as a custom template.
    ///
    /// The archive is copied into managed storage as `<name>.tar` and the
    /// stored copy is measured. An existing entry of the same name is
    /// replaced; a built-in entry stays built-in and keeps its download
    /// source and tags.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a bad name, `NotFound` if `local_file` does
    /// not exist, or an I/O error if copying or persisting fails.
    pub async fn add(&self, template: Template, local_file: &Path) -> Result<Template> {
        validate_name(&template.name)?;
        if !tokio::fs::try_exists(local_file).await.unwrap_or(false) {
            return Err(WslkitError::NotFound {
                kind: "archive file",
                id: local_file.display().to_string(),
            });
        }
        match archive::inspect(local_file).await {
            Ok(ArchiveFormat::Unknown) => tracing::warn!(
                path = %local_file.display(),
                "archive format not recognized, importing anyway"
            ),
            Ok(format) => tracing::debug!(?format, "archive format"),
            Err(e) => tracing::warn!(error = %e, "archive inspection failed"),
        }

        let staged = self.staging_file()?;
        let _ = tokio::fs::copy(local_file, &staged)
            .await
            .map_err(|e| WslkitError::io(local_file, e))?;
        let (sha256, size) = measure(&staged).await?;

        let name = template.name.clone();
        let stored = self
            .store
            .with_lock(|| async move {
                let dest = self.commit_staged(staged, &name).await?;
                let mut entry = template;
                match self.store.snapshot().get(&entry.name) {
                    Some(previous) if previous.is_default() => {
                        entry.origin = TemplateOrigin::Default;
                        if entry.source_url.is_none() {
                            entry.source_url.clone_from(&previous.source_url);
                        }
                        if entry.tags.is_empty() {
                            entry.tags.clone_from(&previous.tags);
                        }
                    }
                    _ => entry.origin = TemplateOrigin::Custom,
                }
                entry.local_file_path = Some(dest);
                entry.size_bytes = Some(size);
                entry.sha256 = Some(sha256);
                entry.added = Some(Utc::now());
                entry.available = true;
                let _ = self.store.modify(|c| c.upsert(entry.clone()));
                self.store.save().await?;
                Ok::<_, WslkitError>(entry)
            })
            .await?;
        tracing::info!(name = %stored.name, bytes = size, "template added");
        Ok(stored)
    }

    /// Removes the template named `name`.
    ///
    /// Deletes the local archive. Default templates keep their record with
    /// local fields cleared; custom templates are dropped. Returns `false`
    /// when no such template exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be deleted or the catalog
    /// cannot be persisted.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        self.store
            .with_lock(|| async {
                let Some(existing) = self.store.snapshot().get(name).cloned() else {
                    return Ok::<_, WslkitError>(false);
                };
                if let Some(path) = &existing.local_file_path {
                    remove_if_present(path).await?;
                }
                if existing.is_default() {
                    self.store.modify(|c| {
                        if let Some(t) = c.get_mut(name) {
                            t.local_file_path = None;
                            t.added = None;
                            t.available = false;
                        }
                    });
                } else {
                    let _ = self.store.modify(|c| c.remove(name));
                }
                self.store.save().await?;
                tracing::info!(name, kept = existing.is_default(), "template removed");
                Ok(true)
            })
            .await
    }

    /// Re-hashes the local archive of `name` against its recorded digest.
    ///
    /// Returns `true` when there is nothing to check.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown template.
    pub async fn verify(&self, name: &str) -> Result<bool> {
        let template = self.get(name).await.ok_or_else(|| WslkitError::NotFound {
            kind: "template",
            id: name.to_string(),
        })?;
        let Some(path) = &template.local_file_path else {
            return Ok(true);
        };
        let ok = hash::verify(path, template.sha256.as_ref()).await;
        if !ok {
            tracing::warn!(name, path = %path.display(), "template failed verification");
        }
        Ok(ok)
    }

    /// Aggregates declared and downloaded sizes.
    pub async fn storage_stats(&self) -> StorageStats {
        let catalog = self.store.snapshot();
        let mut stats = StorageStats {
            total_templates: catalog.len(),
            ..StorageStats::default()
        };
        for template in &catalog.distributions {
            stats.declared_bytes += template.size_bytes.unwrap_or(0);
            let Some(path) = &template.local_file_path else {
                continue;
            };
            if let Ok(meta) = tokio::fs::metadata(path).await {
                if meta.is_file() {
                    stats.downloaded_templates += 1;
                    stats.downloaded_bytes += meta.len();
                }
            }
        }
        stats
    }

    /// Makes sure `name` has a local archive, downloading it if needed.
    ///
    /// # Errors
    ///
    /// Returns `NotAvailable` when offline or when no download chain is
    /// configured, the chain's error when every stage fails, or an I/O error
    /// if the archive cannot be committed.
    pub async fn ensure_available(&self, name: &str, progress: &ProgressFn<'_>) -> Result<Template> {
        validate_name(name)?;
        let existing = self.get(name).await;
        if let Some(template) = existing.as_ref().filter(|t| t.available) {
            return Ok(template.clone());
        }
        if self.offline {
            return Err(not_available(name, "offline mode is enabled"));
        }
        let Some(chain) = &self.downloader else {
            return Err(not_available(name, "no download source is configured"));
        };

        let staged = self.staging_file()?;
        let request = DownloadRequest {
            name,
            dest: &staged,
            source_url: existing.as_ref().and_then(|t| t.source_url.as_deref()),
            expected_sha256: existing.as_ref().and_then(|t| t.sha256.as_ref()),
            progress,
        };
        let acquired = chain.acquire(&request).await?;
        let (sha256, size) = measure(&staged).await?;
        let stage = acquired.stage;
        let registry_entry = acquired.registry_entry;

        let stored = self
            .store
            .with_lock(|| async move {
                let dest = self.commit_staged(staged, name).await?;
                let mut entry = self
                    .store
                    .snapshot()
                    .get(name)
                    .cloned()
                    .or_else(|| registry_entry.as_ref().map(RegistryEntry::to_template))
                    .unwrap_or_else(|| Template::new(name).with_origin(TemplateOrigin::Default));
                entry.local_file_path = Some(dest);
                entry.size_bytes = Some(size);
                entry.sha256 = Some(sha256);
                entry.added = Some(Utc::now());
                entry.available = true;
                let _ = self.store.modify(|c| c.upsert(entry.clone()));
                self.store.save().await?;
                Ok::<_, WslkitError>(entry)
            })
            .await?;
        tracing::info!(name, %stage, bytes = size, "template downloaded");
        Ok(stored)
    }

    fn staging_file(&self) -> Result<TempPath> {
        let dir = self.layout.distros_dir();
        std::fs::create_dir_all(&dir).map_err(|e| WslkitError::io(&dir, e))?;
        let file = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(".partial")
            .tempfile_in(&dir)
            .map_err(|e| WslkitError::io(&dir, e))?;
        Ok(file.into_temp_path())
    }

    async fn commit_staged(&self, staged: TempPath, name: &str) -> Result<PathBuf> {
        let dest = self.layout.archive_path(name);
        tokio::fs::rename(&staged, &dest)
            .await
            .map_err(|e| WslkitError::io(&dest, e))?;
        let _ = staged.keep();
        Ok(dest)
    }
}

fn not_available(name: &str, reason: &str) -> WslkitError {
    WslkitError::NotAvailable {
        kind: "template",
        id: name.to_string(),
        reason: reason.to_string(),
    }
}

async fn measure(path: &Path) -> Result<(Sha256Hash, u64)> {
    let sha256 = hash::hash_file(path).await?;
    let size = tokio::fs::metadata(path)
        .await
        .map_err(|e| WslkitError::io(path, e))?
        .len();
    Ok((sha256, size))
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WslkitError::io(path, e)),
    }
}

/// Merges registry entries into `catalog`, returning how many were touched.
///
/// Default entries take the registry's display name, source URL and, while
/// no local archive exists, its checksum. Custom entries win over the
/// registry. Unknown names are inserted as default `official` templates.
pub fn merge_registry(catalog: &mut Catalog, entries: &[RegistryEntry]) -> usize {
    let mut changed = 0;
    for entry in entries {
        if validate_name(&entry.name).is_err() {
            tracing::debug!(name = %entry.name, "skipping registry entry with unusable name");
            continue;
        }
        match catalog.get_mut(&entry.name) {
            Some(existing) if existing.is_default() => {
                existing.display_name.clone_from(&entry.friendly_name);
                if let Some(url) = entry.importable_url() {
                    existing.source_url = Some(url.to_string());
                }
                if existing.local_file_path.is_none() && entry.sha256.is_some() {
                    existing.sha256.clone_from(&entry.sha256);
                }
                changed += 1;
            }
            Some(_) => {}
            None => {
                let _ = catalog.upsert(entry.to_template());
                changed += 1;
            }
        }
    }
    changed
}
