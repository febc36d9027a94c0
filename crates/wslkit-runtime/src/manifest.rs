//! Per-image provenance manifests.
//!
//! A manifest records where an image came from: the ancestor chain from
//! the root template through every clone parent, and an append-only list
//! of the operations that produced it.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wslkit_common::constants::MANIFEST_SCHEMA_VERSION;
use wslkit_common::error::{Result, WslkitError};
use wslkit_common::types::ImageId;

/// Operation recorded in a manifest layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerOp {
    /// Imported from a template.
    Created,
    /// Exported from another image and re-imported.
    Cloned,
}

/// One step in an image's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// What happened.
    pub op: LayerOp,
    /// Template or image the step started from.
    pub from: String,
    /// When the step ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

/// Identity and ancestry of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Stable image identifier.
    pub id: ImageId,
    /// Image name.
    pub name: String,
    /// Ancestors from the root template to the direct parent.
    pub lineage: Vec<String>,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Tool and version that created the image.
    pub created_by: String,
    /// Direct parent image, for clones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Provenance document of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version.
    pub version: u32,
    /// Identity and ancestry.
    pub metadata: ManifestMetadata,
    /// Operations that produced the image, oldest first.
    pub layers: Vec<Layer>,
}

impl Manifest {
    /// Manifest of an image imported directly from `template`.
    #[must_use]
    pub fn derive_from_template(template: &str, name: &str, created_by: &str) -> Self {
        let now = Utc::now();
        Self {
            version: MANIFEST_SCHEMA_VERSION,
            metadata: ManifestMetadata {
                id: ImageId::generate(),
                name: name.to_string(),
                lineage: vec![template.to_string()],
                created: now,
                created_by: created_by.to_string(),
                parent: None,
            },
            layers: vec![Layer {
                op: LayerOp::Created,
                from: template.to_string(),
                at: Some(now),
            }],
        }
    }

    /// Manifest of `name`, cloned from `parent_name`.
    ///
    /// Inherits the parent's lineage and layers when the parent has a
    /// manifest. The parent is appended to the lineage unless it is
    /// already the last entry.
    #[must_use]
    pub fn derive_from_clone(
        parent: Option<&Self>,
        parent_name: &str,
        name: &str,
        created_by: &str,
    ) -> Self {
        let now = Utc::now();
        let (mut lineage, mut layers) = parent.map_or_else(
            || (Vec::new(), Vec::new()),
            |p| (p.metadata.lineage.clone(), p.layers.clone()),
        );
        if lineage.last().map(String::as_str) != Some(parent_name) {
            lineage.push(parent_name.to_string());
        }
        layers.push(Layer {
            op: LayerOp::Cloned,
            from: parent_name.to_string(),
            at: Some(now),
        });
        Self {
            version: MANIFEST_SCHEMA_VERSION,
            metadata: ManifestMetadata {
                id: ImageId::generate(),
                name: name.to_string(),
                lineage,
                created: now,
                created_by: created_by.to_string(),
                parent: Some(parent_name.to_string()),
            },
            layers,
        }
    }

    /// Root template of the lineage.
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        self.metadata.lineage.first().map(String::as_str)
    }
}

/// Manifest documents stored as `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the manifest of `name`.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Writes the manifest under its metadata name.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the atomic write fails.
    pub async fn write(&self, manifest: &Manifest) -> Result<()> {
        let path = self.path(&manifest.metadata.name);
        let bytes = serde_json::to_vec_pretty(manifest)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || wslkit_common::fs::write_atomic(&target, &bytes))
            .await
            .map_err(|e| WslkitError::io(&path, std::io::Error::other(e)))??;
        tracing::debug!(name = %manifest.metadata.name, "manifest written");
        Ok(())
    }

    /// Reads the manifest of `name`; a missing manifest is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn read(&self, name: &str) -> Result<Option<Manifest>> {
        let path = self.path(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WslkitError::io(&path, e)),
        }
    }

    /// Whether `name` has a manifest on disk.
    pub async fn has(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path(name)).await.unwrap_or(false)
    }

    /// Deletes the manifest of `name`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WslkitError::io(&path, e)),
        }
    }
}
