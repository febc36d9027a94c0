//! Per-name mutual exclusion for image operations.
//!
//! Two operations touching the same image name never interleave. Names are
//! compared case-insensitively and multi-name acquisitions take their locks
//! in sorted order so that `clone a b` and `clone b a` cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Table of named async locks.
#[derive(Debug, Default)]
pub struct NameLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

/// Holds the locks of one or more names until dropped.
#[derive(Debug)]
pub struct NameGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl NameLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until every name in `names` is free and takes them all.
    pub async fn acquire(&self, names: &[&str]) -> NameGuard {
        let mut keys: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
        keys.sort();
        keys.dedup();

        let slots: Vec<Slot> = {
            let mut table = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            table.retain(|_, slot| Arc::strong_count(slot) > 1);
            keys.iter()
                .map(|k| Arc::clone(table.entry(k.clone()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(slots.len());
        for slot in slots {
            guards.push(slot.lock_owned().await);
        }
        NameGuard { _guards: guards }
    }

    /// Number of names currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
