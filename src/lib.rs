//! Larder - a persistent, file-backed cache pool.
//!
//! Stores one serialized blob per key in a directory, so cached values
//! survive process restarts without a database or external cache service.
//! Items carry an optional absolute expiration; hit status is re-evaluated
//! on every read. Writes go through a temp-file rename so a concurrent
//! writer to the same key is never observed half-written.
//!
//! ```
//! use chrono::TimeDelta;
//! use larder::{CacheItem, CachePool, FileCachePool};
//! use serde_json::json;
//!
//! # fn main() -> larder::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let mut pool = FileCachePool::open(dir.path())?;
//!
//! let mut item = pool.get_item("answer")?;
//! assert!(!item.is_hit());
//!
//! item.set(json!(42)).expires_after(TimeDelta::hours(1));
//! assert!(pool.save(&item));
//!
//! let item = pool.get_item("answer")?;
//! assert_eq!(item.get(), Some(&json!(42)));
//! # Ok(())
//! # }
//! ```

// Private submodules, re-exported through this gateway
mod entry;
mod errors;
mod pool;
mod store;

pub use entry::{CacheEntry, CacheItem};
pub use errors::{CacheError, Result};
pub use pool::{CachePool, FileCachePool, StoragePool};
pub use store::{DirectoryStore, MemoryStore, Storage};
