//! Image lifecycle: create, clone, delete, list and annotate images.
//!
//! Mutating operations run in three phases. PRECHECK validates inputs
//! against the catalog and the live tool listing, EXECUTE drives the
//! external tool, and COMMIT records the manifest and registry entry. A
//! failure in EXECUTE or COMMIT triggers a best-effort ROLLBACK and the
//! original error is returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wslkit_common::constants::APP_NAME;
use wslkit_common::error::{Result, WslkitError};
use wslkit_common::layout::StorageLayout;
use wslkit_common::types::validate_name;
use wslkit_core::wsl::{WslDistro, WslTool};
use wslkit_distro::manager::DistroCatalogManager;

use crate::manifest::{Manifest, ManifestStore};
use crate::name_lock::NameLocks;
use crate::registry::{ImageRecord, ImageRegistry, SourceType};

/// Caller-supplied settings for a new image.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    /// Install directory; defaults to `<root>/images/instances/<name>`.
    pub install_path: Option<PathBuf>,
    /// Display name; defaults to the image name.
    pub display_name: Option<String>,
    /// Description stored in the registry.
    pub description: Option<String>,
    /// WSL version passed to the import.
    pub version: Option<u8>,
}

/// User-editable image properties.
///
/// Any other key in a JSON patch is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImagePatch {
    /// New display name.
    pub display_name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New enabled flag.
    pub enabled: Option<bool>,
}

impl ImagePatch {
    fn apply(self, record: &mut ImageRecord) {
        if let Some(display_name) = self.display_name {
            record.display_name = display_name;
        }
        if let Some(description) = self.description {
            record.description = description;
        }
        if let Some(enabled) = self.enabled {
            record.enabled = enabled;
        }
    }
}

/// A live image joined with its registry record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    /// Registry metadata.
    #[serde(flatten)]
    pub record: ImageRecord,
    /// State reported by the tool.
    pub state: String,
    /// WSL version of the instance.
    pub wsl_version: u8,
    /// Whether the instance is the tool's default.
    pub is_default: bool,
}

/// Registry record joined with the image's manifest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    /// Registry metadata.
    #[serde(flatten)]
    pub record: ImageRecord,
    /// Provenance manifest, absent for legacy images.
    pub manifest: Option<Manifest>,
}

/// Creates, clones and deletes images and keeps their side stores.
#[derive(Debug)]
pub struct ImageLifecycleManager {
    layout: StorageLayout,
    tool: WslTool,
    catalog: Arc<DistroCatalogManager>,
    manifests: ManifestStore,
    registry: tokio::sync::Mutex<ImageRegistry>,
    locks: NameLocks,
    created_by: String,
}

impl ImageLifecycleManager {
    /// Opens the image side stores under `layout`.
    pub async fn open(
        layout: StorageLayout,
        tool: WslTool,
        catalog: Arc<DistroCatalogManager>,
    ) -> Self {
        let registry = ImageRegistry::load(layout.image_registry_file()).await;
        Self {
            manifests: ManifestStore::new(layout.manifests_dir()),
            registry: tokio::sync::Mutex::new(registry),
            layout,
            tool,
            catalog,
            locks: NameLocks::new(),
            created_by: format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Overrides the `created_by` value stamped on new images.
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// The manifest store.
    #[must_use]
    pub const fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    /// Imports the archive of `template_name` as the new image `new_name`.
    ///
    /// Never downloads: the template must already be available locally.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown template, `NotAvailable` when it has
    /// no local archive, `AlreadyExists` when `new_name` is registered, or the
    /// error of the failed import or commit.
    pub async fn create_from_template(
        &self,
        template_name: &str,
        new_name: &str,
        opts: ImageOptions,
    ) -> Result<ImageRecord> {
        validate_name(new_name)?;
        let _guard = self.locks.acquire(&[new_name]).await;
        tracing::info!(template = template_name, image = new_name, "create: precheck");

        let template = self
            .catalog
            .get(template_name)
            .await
            .ok_or_else(|| WslkitError::NotFound {
                kind: "template",
                id: template_name.to_string(),
            })?;
        let archive = match (&template.local_file_path, template.available) {
            (Some(path), true) => path.clone(),
            _ => {
                return Err(WslkitError::NotAvailable {
                    kind: "template",
                    id: template.name,
                    reason: "no local archive; pull it first".to_string(),
                });
            }
        };
        self.ensure_unregistered(new_name).await?;

        let owned_dir = opts.install_path.is_none();
        let install_dir = opts
            .install_path
            .clone()
            .unwrap_or_else(|| self.layout.instance_dir(new_name));

        let mut applied = Applied::default();
        let result = async {
            tracing::info!(image = new_name, install_dir = %install_dir.display(), "create: execute");
            applied.created_dir = create_install_dir(&install_dir, owned_dir).await?;
            applied.import_started = true;
            self.tool
                .import(new_name, &install_dir, &archive, opts.version)
                .await?;
            applied.imported = true;

            tracing::info!(image = new_name, "create: commit");
            let manifest =
                Manifest::derive_from_template(&template.name, new_name, &self.created_by);
            let record = self
                .new_record(&manifest, &opts, install_dir.clone(), &template.name, SourceType::Template)
                .await;
            self.commit(&manifest, record).await
        }
        .await;

        match result {
            Ok(record) => {
                tracing::info!(image = new_name, template = %template.name, "image created");
                Ok(record)
            }
            Err(e) => {
                self.rollback(new_name, &applied, &e).await;
                Err(e)
            }
        }
    }

    /// Copies the live image `source_name` into the new image `new_name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the source is not live, `AlreadyExists` when
    /// the target is, or the error of the failed export, import or commit.
    pub async fn clone_image(
        &self,
        source_name: &str,
        new_name: &str,
        opts: ImageOptions,
    ) -> Result<ImageRecord> {
        validate_name(new_name)?;
        let _guard = self.locks.acquire(&[source_name, new_name]).await;
        tracing::info!(source = source_name, image = new_name, "clone: precheck");

        let live = self.tool.list().await?;
        let source = live
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(source_name))
            .map(|d| d.name.clone())
            .ok_or_else(|| WslkitError::NotFound {
                kind: "image",
                id: source_name.to_string(),
            })?;
        if is_live(&live, new_name) {
            return Err(WslkitError::AlreadyExists {
                kind: "image",
                id: new_name.to_string(),
            });
        }

        let owned_dir = opts.install_path.is_none();
        let install_dir = opts
            .install_path
            .clone()
            .unwrap_or_else(|| self.layout.instance_dir(new_name));

        let mut applied = Applied::default();
        let result = async {
            self.export_and_import(
                &source,
                new_name,
                &install_dir,
                owned_dir,
                opts.version,
                &mut applied,
            )
            .await?;

            tracing::info!(image = new_name, "clone: commit");
            let parent = match self.manifests.read(&source).await {
                Ok(parent) => parent,
                Err(e) => {
                    tracing::warn!(image = %source, error = %e, "ignoring unreadable parent manifest");
                    None
                }
            };
            let manifest =
                Manifest::derive_from_clone(parent.as_ref(), &source, new_name, &self.created_by);
            let record = self
                .new_record(&manifest, &opts, install_dir.clone(), &source, SourceType::Image)
                .await;
            self.commit(&manifest, record).await
        }
        .await;

        match result {
            Ok(record) => {
                tracing::info!(image = new_name, source = %source, "image cloned");
                Ok(record)
            }
            Err(e) => {
                self.rollback(new_name, &applied, &e).await;
                Err(e)
            }
        }
    }

    /// Exports `source` into a scratch directory under `<root>/tmp` and
    /// imports the archive as `new_name`. The scratch directory is removed
    /// whatever the outcome.
    async fn export_and_import(
        &self,
        source: &str,
        new_name: &str,
        install_dir: &Path,
        owned_dir: bool,
        version: Option<u8>,
        applied: &mut Applied,
    ) -> Result<()> {
        let tmp_dir = self.layout.tmp_dir();
        create_dir(&tmp_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("clone-")
            .tempdir_in(&tmp_dir)
            .map_err(|e| WslkitError::io(&tmp_dir, e))?;
        let archive = scratch.path().join(format!("{source}.tar"));

        tracing::info!(source, image = new_name, scratch = %scratch.path().display(), "clone: execute");
        let result = async {
            self.tool.export(source, &archive).await?;
            applied.created_dir = create_install_dir(install_dir, owned_dir).await?;
            applied.import_started = true;
            self.tool.import(new_name, install_dir, &archive, version).await?;
            applied.imported = true;
            Ok::<_, WslkitError>(())
        }
        .await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!(path = %scratch_path.display(), error = %e, "failed to remove clone scratch directory");
        }
        result
    }

    /// Unregisters and forgets image `name`.
    ///
    /// Works for images without a manifest or registry entry as long as the
    /// tool knows them.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the name is neither live nor recorded, or the
    /// error of the failed unregister or cleanup.
    pub async fn delete_image(&self, name: &str) -> Result<()> {
        let _guard = self.locks.acquire(&[name]).await;
        let live = self.tool.find(name).await?;
        let record = self.registry.lock().await.get(name).cloned();
        let canonical = match (&live, &record) {
            (_, Some(record)) => record.name.clone(),
            (Some(distro), None) => distro.name.clone(),
            (None, None) => {
                return Err(WslkitError::NotFound {
                    kind: "image",
                    id: name.to_string(),
                });
            }
        };

        if let Some(distro) = &live {
            self.tool.unregister(&distro.name).await?;
        }
        if let Some(dir) = record.as_ref().and_then(|r| r.install_path.as_deref()) {
            remove_dir(dir).await?;
        }
        let _ = self.manifests.delete(&canonical).await?;

        let mut registry = self.registry.lock().await;
        if registry.remove(&canonical).is_some() {
            registry.save().await?;
        }
        tracing::info!(image = %canonical, "image deleted");
        Ok(())
    }

    /// Lists live images, reconciling them into the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool listing fails.
    pub async fn list_images(&self) -> Result<Vec<ImageView>> {
        let live = self.tool.list().await?;
        let tool_version = self.tool.version().await;
        let mut manifest_flags = HashMap::with_capacity(live.len());
        for distro in &live {
            let has_manifest = self.manifests.has(&distro.name).await;
            let _ = manifest_flags.insert(distro.name.clone(), has_manifest);
        }

        let mut registry = self.registry.lock().await;
        let adopted = registry.reconcile(
            &live,
            |name| manifest_flags.get(name).copied().unwrap_or(false),
            tool_version.as_deref(),
        );
        if let Err(e) = registry.save().await {
            tracing::warn!(error = %e, "failed to persist reconciled image registry");
        }
        tracing::debug!(live = live.len(), adopted, "images listed");

        Ok(live
            .into_iter()
            .filter_map(|distro| {
                registry.get(&distro.name).cloned().map(|record| ImageView {
                    record,
                    state: distro.state,
                    wsl_version: distro.version,
                    is_default: distro.is_default,
                })
            })
            .collect())
    }

    /// Applies `patch` to the registry record of `name`.
    ///
    /// A live image missing from the registry is adopted first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the image is neither recorded nor live, or an
    /// error if the registry cannot be saved.
    pub async fn update_image_properties(
        &self,
        name: &str,
        patch: ImagePatch,
    ) -> Result<ImageRecord> {
        let _guard = self.locks.acquire(&[name]).await;
        let known = self.registry.lock().await.get(name).is_some();
        let adopt = if known {
            None
        } else {
            let distro = self
                .tool
                .find(name)
                .await?
                .ok_or_else(|| WslkitError::NotFound {
                    kind: "image",
                    id: name.to_string(),
                })?;
            let has_manifest = self.manifests.has(&distro.name).await;
            Some(ImageRecord::legacy(&distro.name, has_manifest, self.tool.version().await))
        };

        let mut registry = self.registry.lock().await;
        if let Some(record) = adopt {
            tracing::info!(image = %record.name, "adopting unmanaged instance");
            let _ = registry.insert(record);
        }
        let record = registry.get_mut(name).ok_or_else(|| WslkitError::NotFound {
            kind: "image",
            id: name.to_string(),
        })?;
        patch.apply(record);
        let updated = record.clone();
        registry.save().await?;
        tracing::info!(image = %updated.name, "image properties updated");
        Ok(updated)
    }

    /// Registry record and manifest of `name`, without calling the tool.
    pub async fn get_image_info(&self, name: &str) -> Option<ImageInfo> {
        let record = self.registry.lock().await.get(name).cloned()?;
        let manifest = match self.manifests.read(&record.name).await {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(image = %record.name, error = %e, "ignoring unreadable manifest");
                None
            }
        };
        Some(ImageInfo { record, manifest })
    }

    async fn ensure_unregistered(&self, name: &str) -> Result<()> {
        if let Some(existing) = self.tool.find(name).await? {
            return Err(WslkitError::AlreadyExists {
                kind: "image",
                id: existing.name,
            });
        }
        Ok(())
    }

    async fn new_record(
        &self,
        manifest: &Manifest,
        opts: &ImageOptions,
        install_dir: PathBuf,
        source: &str,
        source_type: SourceType,
    ) -> ImageRecord {
        let name = manifest.metadata.name.clone();
        ImageRecord {
            id: manifest.metadata.id.clone(),
            display_name: opts.display_name.clone().unwrap_or_else(|| name.clone()),
            name,
            description: opts.description.clone().unwrap_or_default(),
            source: Some(source.to_string()),
            source_type: Some(source_type),
            created: manifest.metadata.created,
            created_by: self.created_by.clone(),
            enabled: true,
            install_path: Some(install_dir),
            tool_version: self.tool.version().await,
            has_manifest: true,
        }
    }

    async fn commit(&self, manifest: &Manifest, record: ImageRecord) -> Result<ImageRecord> {
        self.manifests.write(manifest).await?;
        let mut registry = self.registry.lock().await;
        let _ = registry.insert(record.clone());
        registry.save().await?;
        Ok(record)
    }

    /// Undoes what a failed create or clone applied. Every step is attempted
    /// and failures are only logged.
    ///
    /// A duplicate refused by the tool belongs to someone else and is left
    /// untouched.
    async fn rollback(&self, name: &str, applied: &Applied, cause: &WslkitError) {
        if !applied.imported && matches!(cause, WslkitError::AlreadyExists { .. }) {
            tracing::warn!(image = name, error = %cause, "name taken by another instance, nothing to roll back");
            return;
        }
        tracing::warn!(image = name, error = %cause, "rolling back");
        if applied.import_started {
            match self.tool.find(name).await {
                Ok(Some(distro)) => {
                    if let Err(e) = self.tool.unregister(&distro.name).await {
                        tracing::warn!(image = name, error = %e, "rollback: unregister failed");
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(image = name, error = %e, "rollback: listing failed"),
            }
        }
        if let Some(dir) = &applied.created_dir {
            if let Err(e) = remove_dir(dir).await {
                tracing::warn!(image = name, error = %e, "rollback: install directory not removed");
            }
        }
        if !applied.imported {
            return;
        }
        if let Err(e) = self.manifests.delete(name).await {
            tracing::warn!(image = name, error = %e, "rollback: manifest not removed");
        }
        let mut registry = self.registry.lock().await;
        if registry.remove(name).is_some() {
            if let Err(e) = registry.save().await {
                tracing::warn!(image = name, error = %e, "rollback: registry not saved");
            }
        }
    }
}

/// Side effects of a create or clone, as far as it got.
#[derive(Debug, Default)]
struct Applied {
    /// Install directory this operation brought into existence.
    created_dir: Option<PathBuf>,
    /// The import was handed to the tool, which may have registered the name.
    import_started: bool,
    /// The import succeeded; the name is ours.
    imported: bool,
}

fn is_live(live: &[WslDistro], name: &str) -> bool {
    live.iter().any(|d| d.name.eq_ignore_ascii_case(name))
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| WslkitError::io(dir, e))
}

/// Creates `dir`, returning it when it is a default location this call
/// brought into existence.
async fn create_install_dir(dir: &Path, owned: bool) -> Result<Option<PathBuf>> {
    let existed = tokio::fs::try_exists(dir).await.unwrap_or(true);
    create_dir(dir).await?;
    Ok((owned && !existed).then(|| dir.to_path_buf()))
}

async fn remove_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WslkitError::io(dir, e)),
    }
}
