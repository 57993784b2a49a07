use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    cached: Mutex<HashMap<u64, usize>>,
}

/// Bookkeeping of every dataset currently holding its partitions in memory.
///
/// All datasets derived from the same source share a registry, it's the
/// equivalent of the block manager of a distributed collection engine.
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    inner: Arc<RegistryInner>,
}

impl CacheRegistry {
    /// Creates a new, empty `CacheRegistry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh dataset identifier.
    pub(crate) fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Records that dataset `id` holds `records` records in memory.
    pub(crate) fn insert(&self, id: u64, records: usize) {
        self.inner.cached.lock().insert(id, records);
    }

    /// Forgets dataset `id`.
    ///
    /// # Returns
    /// Whether the dataset was cached.
    pub(crate) fn remove(&self, id: u64) -> bool {
        self.inner.cached.lock().remove(&id).is_some()
    }

    /// Whether the dataset with identifier `id` currently holds its partitions in memory.
    pub fn is_cached(&self, id: u64) -> bool {
        self.inner.cached.lock().contains_key(&id)
    }

    /// The amount of datasets currently cached.
    pub fn cached_datasets(&self) -> usize {
        self.inner.cached.lock().len()
    }

    /// The total amount of records held by all cached datasets.
    pub fn cached_records(&self) -> usize {
        self.inner.cached.lock().values().sum()
    }
}
