//! Image registry: metadata about images, queryable without the tool.
//!
//! The registry is a JSON map from image name to [`ImageRecord`]. It is a
//! secondary index: the external tool is authoritative for which images
//! exist. Listings reconcile new instances into the registry but never
//! evict, so a transient listing failure cannot lose metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wslkit_common::error::{Result, WslkitError};
use wslkit_common::types::ImageId;
use wslkit_core::wsl::WslDistro;

/// What an image was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// A catalog template.
    Template,
    /// Another image.
    Image,
}

/// Registry entry for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Stable identifier.
    pub id: ImageId,
    /// Registered name.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Template or image this image was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Kind of [`Self::source`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    /// When the image was created or first seen.
    pub created: DateTime<Utc>,
    /// Who created the image.
    #[serde(default)]
    pub created_by: String,
    /// User-controlled flag.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Install directory chosen at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
    /// External tool version last observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    /// Whether a provenance manifest exists.
    #[serde(default)]
    pub has_manifest: bool,
}

const fn default_enabled() -> bool {
    true
}

impl ImageRecord {
    /// Record for an instance found in a listing but never created here.
    #[must_use]
    pub fn legacy(name: &str, has_manifest: bool, tool_version: Option<String>) -> Self {
        Self {
            id: ImageId::generate(),
            name: name.to_string(),
            display_name: name.to_string(),
            description: String::new(),
            source: None,
            source_type: None,
            created: Utc::now(),
            created_by: "external".to_string(),
            enabled: true,
            install_path: None,
            tool_version,
            has_manifest,
        }
    }
}

/// In-memory registry bound to its JSON file.
#[derive(Debug)]
pub struct ImageRegistry {
    path: PathBuf,
    records: BTreeMap<String, ImageRecord>,
}

impl ImageRegistry {
    /// Loads the registry at `path`.
    ///
    /// A missing file is an empty registry; a corrupt one is logged and
    /// also treated as empty.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "image registry is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "image registry is unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { path, records }
    }

    /// Persists the registry atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.records)?;
        let target = self.path.clone();
        tokio::task::spawn_blocking(move || wslkit_common::fs::write_atomic(&target, &bytes))
            .await
            .map_err(|e| WslkitError::io(&self.path, std::io::Error::other(e)))??;
        Ok(())
    }

    /// Path of the registry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key under which `name` is stored, matching case-insensitively when
    /// there is no exact entry.
    #[must_use]
    pub fn key_of(&self, name: &str) -> Option<String> {
        if self.records.contains_key(name) {
            return Some(name.to_string());
        }
        self.records
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Returns the record of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ImageRecord> {
        self.key_of(name).and_then(|k| self.records.get(&k))
    }

    /// Returns the record of `name` for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ImageRecord> {
        let key = self.key_of(name)?;
        self.records.get_mut(&key)
    }

    /// Inserts or replaces a record, keyed by its name.
    pub fn insert(&mut self, record: ImageRecord) -> Option<ImageRecord> {
        if let Some(key) = self.key_of(&record.name) {
            if key != record.name {
                let _ = self.records.remove(&key);
            }
        }
        self.records.insert(record.name.clone(), record)
    }

    /// Removes the record of `name`.
    pub fn remove(&mut self, name: &str) -> Option<ImageRecord> {
        let key = self.key_of(name)?;
        self.records.remove(&key)
    }

    /// All records, ordered by name.
    pub fn records(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.values()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Folds a live listing into the registry.
    ///
    /// Unknown instances are adopted as legacy records. Known ones get their
    /// manifest flag and tool version refreshed. Records absent from `live`
    /// are kept. Returns the number of adopted instances.
    pub fn reconcile(
        &mut self,
        live: &[WslDistro],
        has_manifest: impl Fn(&str) -> bool,
        tool_version: Option<&str>,
    ) -> usize {
        let mut adopted = 0;
        for distro in live {
            let manifest = has_manifest(&distro.name);
            if let Some(record) = self.get_mut(&distro.name) {
                record.has_manifest = manifest;
                if let Some(version) = tool_version {
                    record.tool_version = Some(version.to_string());
                }
            } else {
                tracing::info!(name = %distro.name, "adopting unmanaged instance");
                let _ = self.insert(ImageRecord::legacy(
                    &distro.name,
                    manifest,
                    tool_version.map(str::to_string),
                ));
                adopted += 1;
            }
        }
        adopted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(name: &str) -> WslDistro {
        WslDistro {
            name: name.to_string(),
            state: "Stopped".to_string(),
            version: 2,
            is_default: false,
        }
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("images.json");
        assert!(ImageRegistry::load(&path).await.is_empty());
        std::fs::write(&path, b"[not a map").expect("write");
        assert!(ImageRegistry::load(&path).await.is_empty());
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("images").join("images.json");
        let mut registry = ImageRegistry::load(&path).await;
        let _ = registry.insert(ImageRecord::legacy("dev1", false, None));
        registry.save().await.expect("save");

        let reloaded = ImageRegistry::load(&path).await;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("DEV1").map(|r| r.name.as_str()), Some("dev1"));
    }

    #[test]
    fn reconcile_adopts_without_evicting() {
        let mut registry = ImageRegistry {
            path: PathBuf::from("unused"),
            records: BTreeMap::new(),
        };
        let _ = registry.insert(ImageRecord::legacy("offline", true, None));

        let adopted = registry.reconcile(&[live("fresh")], |_| false, Some("2.3.24.0"));
        assert_eq!(adopted, 1);
        assert_eq!(registry.len(), 2);
        let fresh = registry.get("fresh").expect("adopted");
        assert!(!fresh.has_manifest);
        assert!(fresh.source.is_none() && fresh.source_type.is_none());
        assert_eq!(fresh.tool_version.as_deref(), Some("2.3.24.0"));
        assert!(registry.get("offline").is_some());
    }

    #[test]
    fn record_json_is_camel_case_and_enabled_by_default() {
        let record: ImageRecord = serde_json::from_str(
            r#"{"id":"x","name":"n","displayName":"N","created":"2024-01-01T00:00:00Z","sourceType":"image"}"#,
        )
        .expect("parse");
        assert!(record.enabled);
        assert_eq!(record.source_type, Some(SourceType::Image));
        let json = serde_json::to_value(&record).expect("serialize");
        assert!(json.get("hasManifest").is_some());
        assert!(json.get("installPath").is_none());
    }
}
