//! LRU cache of document contents mirrored into a durable store.
//!
//! Every write serializes the whole cache and stores it under one key. The
//! snapshot lists entries from least to most recently used so hydration
//! restores recency as well as contents. Storage failures never propagate:
//! they are logged and reported through the returned [`Persistence`] value.

use crate::lru::LruCache;
use crate::store::KeyValueStore;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "markdown-docs-cache";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<(String, String)>,
}

/// Outcome of mirroring a cache mutation to durable storage.
#[derive(Debug, Clone)]
pub enum Persistence {
    /// The snapshot was written.
    Stored,
    /// No durable store is in use.
    MemoryOnly,
    /// The store rejected the write; the in-memory cache is still updated.
    Failed(Error),
}

impl Persistence {
    /// Whether the change reached durable storage.
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Size and configuration of a cache, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently cached.
    pub size: usize,
    /// Maximum entries.
    pub capacity: usize,
    /// Advisory memory footprint in bytes.
    pub memory_estimate_bytes: usize,
    /// Whether a durable store is mirrored.
    pub persistent: bool,
}

/// String → string LRU cache with best-effort write-through persistence.
pub struct PersistentCache {
    entries: LruCache<String, String>,
    storage_key: String,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.capacity())
            .field("storage_key", &self.storage_key)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl PersistentCache {
    /// Create a cache, probing `store` and hydrating from any saved snapshot.
    ///
    /// If the store is absent or fails its probe the cache runs memory-only.
    pub fn new(
        capacity: usize,
        storage_key: impl Into<String>,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        let store = store.filter(|s| match s.probe() {
            Ok(()) => true,
            Err(e) => {
                warn!("Durable storage unavailable, caching in memory only: {e}");
                false
            },
        });

        let mut cache = Self {
            entries: LruCache::new(capacity),
            storage_key: storage_key.into(),
            store,
        };
        cache.hydrate();
        cache
    }

    /// Cache without durable storage.
    #[must_use]
    pub fn memory_only(capacity: usize) -> Self {
        Self::new(capacity, DEFAULT_STORAGE_KEY, None)
    }

    fn hydrate(&mut self) {
        let Some(store) = &self.store else {
            return;
        };

        let raw = match store.get_item(&self.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read cache snapshot '{}': {e}", self.storage_key);
                return;
            },
        };

        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => {
                let count = snapshot.entries.len();
                for (key, value) in snapshot.entries {
                    self.entries.set(key, value);
                }
                debug!("Hydrated {count} cached documents from '{}'", self.storage_key);
            },
            Ok(snapshot) => {
                warn!(
                    "Ignoring cache snapshot '{}' with unsupported version {}",
                    self.storage_key, snapshot.version
                );
            },
            Err(e) => warn!("Ignoring corrupt cache snapshot '{}': {e}", self.storage_key),
        }
    }

    fn persist(&self) -> Persistence {
        let Some(store) = &self.store else {
            return Persistence::MemoryOnly;
        };

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: self
                .entries
                .iter_by_recency()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        let result = serde_json::to_string(&snapshot)
            .map_err(Error::from)
            .and_then(|json| store.set_item(&self.storage_key, &json));

        match result {
            Ok(()) => Persistence::Stored,
            Err(e) => {
                warn!("Failed to persist cache '{}': {e}", self.storage_key);
                Persistence::Failed(e)
            },
        }
    }

    /// Whether a durable store is in use.
    #[must_use]
    pub const fn uses_storage(&self) -> bool {
        self.store.is_some()
    }

    /// Key under which snapshots are stored.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Cached value for `key`, refreshing its recency.
    pub fn get(&mut self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    /// Insert or update `key` and write the snapshot through.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Persistence {
        if let Some((evicted, _)) = self.entries.set(key.into(), value.into()) {
            debug!("Evicted '{evicted}' from document cache");
        }
        self.persist()
    }

    /// Whether `key` is cached. Does not refresh recency.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entries.has(key)
    }

    /// Remove `key` and write the snapshot through.
    pub fn delete(&mut self, key: &str) -> Persistence {
        if self.entries.delete(key).is_none() {
            return if self.uses_storage() {
                Persistence::Stored
            } else {
                Persistence::MemoryOnly
            };
        }
        self.persist()
    }

    /// Drop every entry and the persisted snapshot.
    pub fn clear(&mut self) -> Persistence {
        self.entries.clear();
        let Some(store) = &self.store else {
            return Persistence::MemoryOnly;
        };
        match store.remove_item(&self.storage_key) {
            Ok(()) => Persistence::Stored,
            Err(e) => {
                warn!("Failed to remove cache snapshot '{}': {e}", self.storage_key);
                Persistence::Failed(e)
            },
        }
    }

    /// Drop every in-memory entry, leaving the persisted snapshot in place.
    pub fn release(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached keys in map order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.entries().map(|(k, _)| k.as_str())
    }

    /// Size, capacity and memory estimate.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            capacity: self.entries.capacity(),
            memory_estimate_bytes: self.entries.memory_estimate(),
            persistent: self.uses_storage(),
        }
    }
}
