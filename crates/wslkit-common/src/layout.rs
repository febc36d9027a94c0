//! On-disk layout of the storage root.
//!
//! ```text
//! <root>/distros/catalog.json
//! <root>/distros/<name>.tar
//! <root>/images/images.json
//! <root>/images/manifests/<name>.json
//! <root>/images/instances/<name>/
//! <root>/tmp/
//! ```

use std::path::{Path, PathBuf};

use crate::constants::{
    ARCHIVE_EXTENSION, CATALOG_FILE, DISTROS_DIR, IMAGE_REGISTRY_FILE, IMAGES_DIR, INSTANCES_DIR,
    MANIFESTS_DIR, TMP_DIR,
};
use crate::error::{Result, WslkitError};

/// Resolves every path the stores use from a single injected root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Creates a layout rooted at `root`. Nothing is created on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates every directory of the layout.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.distros_dir(),
            self.manifests_dir(),
            self.instances_dir(),
            self.tmp_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| WslkitError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Returns the storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the catalog and template archives.
    #[must_use]
    pub fn distros_dir(&self) -> PathBuf {
        self.root.join(DISTROS_DIR)
    }

    /// Path of the catalog file.
    #[must_use]
    pub fn catalog_file(&self) -> PathBuf {
        self.distros_dir().join(CATALOG_FILE)
    }

    /// Path of the managed archive for template `name`.
    #[must_use]
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.distros_dir()
            .join(format!("{name}.{ARCHIVE_EXTENSION}"))
    }

    /// Directory holding image metadata.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    /// Directory holding per-image manifests.
    #[must_use]
    pub fn manifests_dir(&self) -> PathBuf {
        self.images_dir().join(MANIFESTS_DIR)
    }

    /// Path of the image registry file.
    #[must_use]
    pub fn image_registry_file(&self) -> PathBuf {
        self.images_dir().join(IMAGE_REGISTRY_FILE)
    }

    /// Parent of default install directories.
    #[must_use]
    pub fn instances_dir(&self) -> PathBuf {
        self.images_dir().join(INSTANCES_DIR)
    }

    /// Default install directory for image `name`.
    #[must_use]
    pub fn instance_dir(&self, name: &str) -> PathBuf {
        self.instances_dir().join(name)
    }

    /// Scratch directory for ephemeral exports and staging files.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_follow_documented_structure() {
        let layout = StorageLayout::new("/data");
        assert!(layout.catalog_file().ends_with("distros/catalog.json"));
        assert!(layout.archive_path("alpine-3.19").ends_with("distros/alpine-3.19.tar"));
        assert!(layout.manifests_dir().ends_with("images/manifests"));
        assert!(layout.image_registry_file().ends_with("images/images.json"));
        assert!(layout.instance_dir("dev1").ends_with("images/instances/dev1"));
    }

    #[test]
    fn ensure_dirs_creates_every_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        layout.ensure_dirs().expect("ensure dirs");
        assert!(layout.distros_dir().is_dir());
        assert!(layout.manifests_dir().is_dir());
        assert!(layout.instances_dir().is_dir());
        assert!(layout.tmp_dir().is_dir());
    }
}
