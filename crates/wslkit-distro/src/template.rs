//! Template and catalog data model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wslkit_common::constants::CATALOG_SCHEMA_VERSION;
use wslkit_common::types::{Architecture, Sha256Hash};

/// Where a template entry came from, which decides how removal behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateOrigin {
    /// Built-in or registry-advertised; never fully deleted.
    Default,
    /// User-imported; deleted outright on removal.
    #[default]
    Custom,
}

/// A pristine, reusable archive serving as a creation source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Unique identifier inside the catalog.
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Distribution version string.
    #[serde(default)]
    pub version: String,
    /// Target architecture.
    #[serde(default)]
    pub architecture: Architecture,
    /// Declared or measured archive size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Declared or measured archive digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<Sha256Hash>,
    /// Download location, also used as the fallback mirror.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Managed archive on disk, when downloaded or imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_file_path: Option<PathBuf>,
    /// When the archive was added to managed storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added: Option<DateTime<Utc>>,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the archive is present locally. Recomputed, never trusted.
    #[serde(default)]
    pub available: bool,
    /// Built-in or user-imported.
    #[serde(default)]
    pub origin: TemplateOrigin,
}

impl Template {
    /// Creates a custom template with only a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            version: String::new(),
            architecture: Architecture::default(),
            size_bytes: None,
            sha256: None,
            source_url: None,
            local_file_path: None,
            added: None,
            tags: Vec::new(),
            available: false,
            origin: TemplateOrigin::Custom,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the version string.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the architecture.
    #[must_use]
    pub const fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    /// Sets the download URL.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the origin.
    #[must_use]
    pub const fn with_origin(mut self, origin: TemplateOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Returns whether this is a built-in template.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.origin == TemplateOrigin::Default
    }

    /// Recomputes [`Self::available`] from the presence of the local archive.
    pub async fn refresh_availability(&mut self) {
        self.available = match &self.local_file_path {
            Some(path) => tokio::fs::metadata(path)
                .await
                .is_ok_and(|meta| meta.is_file()),
            None => false,
        };
    }
}

/// The durable registry of all known templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Schema version of the file.
    #[serde(rename = "version")]
    pub schema_version: u32,
    /// Last persisted mutation.
    pub updated: DateTime<Utc>,
    /// Known templates, unique by name.
    pub distributions: Vec<Template>,
}

impl Catalog {
    /// Creates a catalog holding `distributions`.
    #[must_use]
    pub fn new(distributions: Vec<Template>) -> Self {
        let mut catalog = Self {
            schema_version: CATALOG_SCHEMA_VERSION,
            updated: Utc::now(),
            distributions: Vec::with_capacity(distributions.len()),
        };
        for template in distributions {
            let _ = catalog.upsert(template);
        }
        catalog
    }

    /// Returns the template named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.distributions.iter().find(|t| t.name == name)
    }

    /// Returns the template named `name` for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Template> {
        self.distributions.iter_mut().find(|t| t.name == name)
    }

    /// Inserts `template`, replacing any entry with the same name in place.
    ///
    /// Returns the replaced entry.
    pub fn upsert(&mut self, template: Template) -> Option<Template> {
        match self.get_mut(&template.name) {
            Some(existing) => Some(std::mem::replace(existing, template)),
            None => {
                self.distributions.push(template);
                None
            }
        }
    }

    /// Removes and returns the template named `name`.
    pub fn remove(&mut self, name: &str) -> Option<Template> {
        let index = self.distributions.iter().position(|t| t.name == name)?;
        Some(self.distributions.remove(index))
    }

    /// Recomputes availability of every entry.
    pub async fn refresh_availability(&mut self) {
        for template in &mut self.distributions {
            template.refresh_availability().await;
        }
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    /// Whether the catalog has no templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}
