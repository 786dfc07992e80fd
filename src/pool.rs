use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, warn};

use crate::entry::{validate_key, CacheEntry, CacheItem};
use crate::errors::Result;
use crate::store::{DirectoryStore, Storage};

/// Gateway to a collection of persisted cache items.
///
/// Boolean-returning mutation operations report storage failures through
/// their return value instead of an error; only invalid keys surface as
/// `Err`, before any storage access. No failure poisons the pool.
pub trait CachePool {
    /// Fetch the item stored under `key`, or a fresh miss placeholder
    fn get_item(&self, key: &str) -> Result<CacheEntry>;

    /// Fetch one item per requested key, keyed by the requested key
    fn get_items(&self, keys: &[&str]) -> Result<HashMap<String, CacheEntry>>;

    /// Whether a blob exists for `key`. Existence only: the blob is not
    /// decoded and may hold an expired entry
    fn has_item(&self, key: &str) -> Result<bool>;

    /// Persist the entry's full state immediately
    fn save(&mut self, entry: &CacheEntry) -> bool;

    /// Queue the entry for a later `commit`; purely in-memory, never fails
    fn save_deferred(&mut self, entry: CacheEntry) -> bool;

    /// Drain the deferred queue in insertion order, saving each entry;
    /// stops on the first failed save, leaving the rest queued
    fn commit(&mut self) -> bool;

    /// Remove the blob for `key`; `Ok(false)` if the removal fails,
    /// including when the blob was already absent
    fn delete_item(&mut self, key: &str) -> Result<bool>;

    /// Delete keys in sequence, short-circuiting on the first failure
    fn delete_items(&mut self, keys: &[&str]) -> Result<bool>;

    /// Delete every blob in the store; true for an already-empty store
    fn clear(&mut self) -> bool;
}

/// Cache pool over any `Storage` backend
#[derive(Debug)]
pub struct StoragePool<S: Storage> {
    store: S,
    deferred: VecDeque<CacheEntry>,
}

/// The standard pool: one blob file per key in a directory
pub type FileCachePool = StoragePool<DirectoryStore>;

impl FileCachePool {
    /// Open a pool backed by `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_store(DirectoryStore::new(dir)?))
    }

    /// Open a pool under the per-user cache directory for `app`
    pub fn in_user_cache(app: &str) -> Result<Self> {
        Ok(Self::with_store(DirectoryStore::in_user_cache(app)?))
    }
}

impl<S: Storage> StoragePool<S> {
    /// Build a pool over an already-constructed backend
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            deferred: VecDeque::new(),
        }
    }

    /// Number of entries waiting for `commit`
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Delete every blob whose stored expiration has elapsed.
    ///
    /// Blobs that cannot be read or decoded are left in place. Returns
    /// false on the first failed deletion.
    pub fn prune(&mut self) -> bool {
        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("failed to enumerate cache store for prune: {}", e);
                return false;
            }
        };

        let now = Utc::now();
        for key in keys {
            let Ok(bytes) = self.store.read_all(&key) else {
                continue;
            };
            let Ok(entry) = CacheEntry::decode(&bytes) else {
                continue;
            };
            if entry.expiration().is_some_and(|at| at <= now) {
                if let Err(e) = self.store.remove(&key) {
                    warn!("failed to prune expired cache entry {}: {}", key, e);
                    return false;
                }
                debug!("pruned expired cache entry {}", key);
            }
        }
        true
    }
}

impl<S: Storage> CachePool for StoragePool<S> {
    fn get_item(&self, key: &str) -> Result<CacheEntry> {
        validate_key(key)?;
        if !self.store.exists(key) {
            return CacheEntry::new(key);
        }

        let bytes = match self.store.read_all(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                // A concurrent delete can land between the existence check
                // and the read; report a miss rather than an error.
                debug!("read of cached blob {} failed: {}", key, e);
                return CacheEntry::new(key);
            }
        };

        match CacheEntry::decode(&bytes) {
            Ok(entry) if entry.key() == key => Ok(entry),
            Ok(entry) => {
                warn!(
                    "cached blob for {} holds mismatched key {}, treating as miss",
                    key,
                    entry.key()
                );
                CacheEntry::new(key)
            }
            Err(e) => {
                warn!("discarding corrupt cached blob for {}: {}", key, e);
                CacheEntry::new(key)
            }
        }
    }

    fn get_items(&self, keys: &[&str]) -> Result<HashMap<String, CacheEntry>> {
        for key in keys {
            validate_key(key)?;
        }
        let mut items = HashMap::with_capacity(keys.len());
        for key in keys {
            items.insert((*key).to_string(), self.get_item(key)?);
        }
        Ok(items)
    }

    fn has_item(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.store.exists(key))
    }

    fn save(&mut self, entry: &CacheEntry) -> bool {
        let bytes = match entry.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode cache entry {}: {}", entry.key(), e);
                return false;
            }
        };
        match self.store.write_exclusive(entry.key(), &bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to persist cache entry {}: {}", entry.key(), e);
                false
            }
        }
    }

    fn save_deferred(&mut self, entry: CacheEntry) -> bool {
        self.deferred.push_back(entry);
        true
    }

    fn commit(&mut self) -> bool {
        // Destructive drain: a failing entry has already been dequeued and
        // is not restored; only the not-yet-attempted entries stay queued.
        while let Some(entry) = self.deferred.pop_front() {
            if !self.save(&entry) {
                return false;
            }
        }
        true
    }

    fn delete_item(&mut self, key: &str) -> Result<bool> {
        validate_key(key)?;
        match self.store.remove(key) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("failed to delete cache entry {}: {}", key, e);
                Ok(false)
            }
        }
    }

    fn delete_items(&mut self, keys: &[&str]) -> Result<bool> {
        for key in keys {
            validate_key(key)?;
        }
        for key in keys {
            if !self.delete_item(key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn clear(&mut self) -> bool {
        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("failed to enumerate cache store for clear: {}", e);
                return false;
            }
        };
        // Enumerated keys bypass validation: a foreign blob dropped into the
        // directory should still be removable.
        for key in keys {
            if let Err(e) = self.store.remove(&key) {
                warn!("failed to delete cache entry {}: {}", key, e);
                return false;
            }
        }
        true
    }
}
