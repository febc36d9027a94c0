//! Durable catalog persistence with a store-wide operation lock.
//!
//! The in-memory [`Catalog`] lives behind a short-lived synchronous lock
//! that is never held across an await point. Multi-step read-modify-write
//! sequences serialize on a separate FIFO async lock via
//! [`CatalogStore::with_lock`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use wslkit_common::error::{Result, WslkitError};

use crate::template::{Catalog, Template};

/// Owns the catalog document on disk and its in-memory model.
#[derive(Debug)]
pub struct CatalogStore {
    path: PathBuf,
    seed: Vec<Template>,
    model: Mutex<Catalog>,
    op_lock: tokio::sync::Mutex<()>,
}

impl CatalogStore {
    /// Creates a store for the document at `path`.
    ///
    /// The model starts from `seed` until [`Self::load`] runs.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, seed: Vec<Template>) -> Self {
        Self {
            path: path.into(),
            model: Mutex::new(Catalog::new(seed.clone())),
            seed,
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the catalog document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the catalog from disk. Never fails.
    ///
    /// A missing document is replaced by the seed, which is then persisted
    /// on a best-effort basis. An unreadable or corrupt document is logged
    /// and also replaced by the seed, but left untouched on disk until the
    /// next successful save. Availability is recomputed for every entry.
    pub async fn load(&self) {
        let (mut catalog, persist_seed) = match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Catalog>(&bytes) {
                Ok(parsed) => {
                    let mut catalog = Catalog::new(parsed.distributions);
                    catalog.updated = parsed.updated;
                    (catalog, false)
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "catalog document is corrupt, using built-in templates"
                    );
                    (Catalog::new(self.seed.clone()), false)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no catalog found, seeding");
                (Catalog::new(self.seed.clone()), true)
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "catalog document is unreadable, using built-in templates"
                );
                (Catalog::new(self.seed.clone()), false)
            }
        };
        catalog.refresh_availability().await;
        tracing::debug!(templates = catalog.len(), "catalog loaded");
        *self.lock_model() = catalog;

        if persist_seed {
            if let Err(e) = self.save().await {
                tracing::warn!(error = %e, "failed to persist seeded catalog");
            }
        }
    }

    /// Runs `op` while holding the store-wide operation lock.
    ///
    /// Waiters are served in FIFO order. The lock is released when `op`
    /// completes, whether it returns normally, fails, or is cancelled, and
    /// `op`'s result is returned unchanged. The lock is not reentrant.
    pub async fn with_lock<R, F, Fut>(&self, op: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let _guard = self.op_lock.lock().await;
        op().await
    }

    /// Returns a copy of the current catalog.
    #[must_use]
    pub fn snapshot(&self) -> Catalog {
        self.lock_model().clone()
    }

    /// Applies `f` to the in-memory catalog.
    pub fn modify<T>(&self, f: impl FnOnce(&mut Catalog) -> T) -> T {
        f(&mut self.lock_model())
    }

    /// Persists the catalog atomically, stamping its `updated` time.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self) -> Result<()> {
        let bytes = self.modify(|catalog| {
            catalog.updated = Utc::now();
            serde_json::to_vec_pretty(catalog)
        })?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || wslkit_common::fs::write_atomic(&path, &bytes))
            .await
            .map_err(|e| WslkitError::io(&self.path, std::io::Error::other(e)))??;
        tracing::debug!(path = %self.path.display(), "catalog saved");
        Ok(())
    }

    fn lock_model(&self) -> std::sync::MutexGuard<'_, Catalog> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::template::TemplateOrigin;

    fn seed() -> Vec<Template> {
        vec![Template::new("seeded").with_origin(TemplateOrigin::Default)]
    }

    #[tokio::test]
    async fn missing_document_is_seeded_and_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        let store = CatalogStore::new(&path, seed());
        store.load().await;
        assert!(store.snapshot().get("seeded").is_some());
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn corrupt_document_falls_back_to_seed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, b"{ not json").expect("write");
        let store = CatalogStore::new(&path, seed());
        store.load().await;
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(std::fs::read(&path).expect("read"), b"{ not json");
    }

    #[tokio::test]
    async fn save_then_load_preserves_entries_and_recomputes_availability() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        let archive = dir.path().join("x.tar");
        std::fs::write(&archive, b"data").expect("write");

        let store = CatalogStore::new(&path, Vec::new());
        let _ = store.modify(|c| {
            let mut t = Template::new("x");
            t.local_file_path = Some(archive.clone());
            c.upsert(t)
        });
        store.save().await.expect("save");

        std::fs::remove_file(&archive).expect("remove");
        let reloaded = CatalogStore::new(&path, seed());
        reloaded.load().await;
        let catalog = reloaded.snapshot();
        assert!(catalog.get("seeded").is_none());
        assert!(!catalog.get("x").expect("entry").available);
    }

    #[tokio::test]
    async fn with_lock_serializes_overlapping_operations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(CatalogStore::new(dir.path().join("c.json"), Vec::new()));
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let (store, order) = (Arc::clone(&store), Arc::clone(&order));
            tokio::spawn(async move {
                store
                    .with_lock(|| async {
                        order.lock().expect("order").push("first-start");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        order.lock().expect("order").push("first-end");
                    })
                    .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let (store, order) = (Arc::clone(&store), Arc::clone(&order));
            tokio::spawn(async move {
                store
                    .with_lock(|| async {
                        order.lock().expect("order").push("second");
                    })
                    .await;
            })
        };
        first.await.expect("join");
        second.await.expect("join");
        assert_eq!(
            *order.lock().expect("order"),
            vec!["first-start", "first-end", "second"]
        );
    }

    #[tokio::test]
    async fn with_lock_releases_after_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CatalogStore::new(dir.path().join("c.json"), Vec::new());
        let failed: Result<()> = store
            .with_lock(|| async {
                Err(WslkitError::InvalidInput {
                    message: "boom".into(),
                })
            })
            .await;
        assert!(failed.is_err());
        let ok = tokio::time::timeout(Duration::from_secs(1), store.with_lock(|| async { 7 }))
            .await
            .expect("lock released");
        assert_eq!(ok, 7);
    }
}
