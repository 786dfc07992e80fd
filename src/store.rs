use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use crate::errors::Result;

/// Extension given to every cache blob on disk
const BLOB_EXTENSION: &str = "cache";

/// Key-addressable byte store backing a cache pool.
///
/// Each operation maps to one atomic storage primitive; the pool adds no
/// locking of its own on top of this contract.
pub trait Storage {
    /// Whether a blob exists for `key`
    fn exists(&self, key: &str) -> bool;

    /// Read the full blob for `key`; fails if absent
    fn read_all(&self, key: &str) -> Result<Vec<u8>>;

    /// Atomically replace the blob for `key`; a concurrent writer to the
    /// same key is never observed interleaved, last writer wins
    fn write_exclusive(&mut self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the blob for `key`; fails if absent
    fn remove(&mut self, key: &str) -> Result<()>;

    /// Enumerate every key currently stored, in no particular order
    fn list_keys(&self) -> Result<Vec<String>>;
}

/// Filesystem store keeping one blob file per key in a single directory
#[derive(Debug)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Open a store under the per-user cache directory for `app`
    /// (~/.cache/<app> on Linux, ~/Library/Caches/<app> on macOS)
    pub fn in_user_cache(app: &str) -> Result<Self> {
        let dir = if let Some(proj_dirs) = ProjectDirs::from("", "", app) {
            proj_dirs.cache_dir().to_path_buf()
        } else {
            let home = std::env::var("HOME").map_err(|_| {
                io::Error::new(io::ErrorKind::NotFound, "no home directory available")
            })?;
            PathBuf::from(home).join(".cache").join(app)
        };
        Self::new(dir)
    }

    /// The directory holding the blob files
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, BLOB_EXTENSION))
    }
}

impl Storage for DirectoryStore {
    fn exists(&self, key: &str) -> bool {
        self.blob_path(key).is_file()
    }

    fn read_all(&self, key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.blob_path(key))?)
    }

    fn write_exclusive(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        // Write to a temp file in the same directory, then rename over the
        // destination so readers only ever see a complete blob.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(self.blob_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        fs::remove_file(self.blob_path(key))?;
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION)
            {
                continue;
            }
            if let Some(key) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }
}

/// In-memory store, useful for tests and as a non-persistent backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn exists(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    fn read_all(&self, key: &str) -> Result<Vec<u8>> {
        Ok(self.blobs.get(key).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no blob for key {}", key))
        })?)
    }

    fn write_exclusive(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.blobs.remove(key).map(|_| ()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no blob for key {}", key)).into()
        })
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.blobs.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn directory_store_round_trips_blobs() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::new(temp_dir.path()).unwrap();

        assert!(!store.exists("alpha"));
        store.write_exclusive("alpha", b"payload").unwrap();
        assert!(store.exists("alpha"));
        assert_eq!(store.read_all("alpha").unwrap(), b"payload");

        store.remove("alpha").unwrap();
        assert!(!store.exists("alpha"));
    }

    #[test]
    fn directory_store_last_writer_wins() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::new(temp_dir.path()).unwrap();

        store.write_exclusive("k", b"first").unwrap();
        store.write_exclusive("k", b"second").unwrap();
        assert_eq!(store.read_all("k").unwrap(), b"second");
    }

    #[test]
    fn removing_an_absent_key_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::new(temp_dir.path()).unwrap();
        assert!(store.remove("ghost").is_err());
    }

    #[test]
    fn list_keys_skips_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::new(temp_dir.path()).unwrap();

        store.write_exclusive("kept", b"x").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"ignore me").unwrap();
        fs::create_dir(temp_dir.path().join("subdir")).unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["kept".to_string()]);
    }

    #[test]
    fn memory_store_honors_the_same_contract() {
        let mut store = MemoryStore::new();

        assert!(!store.exists("a"));
        assert!(store.read_all("a").is_err());
        assert!(store.remove("a").is_err());

        store.write_exclusive("a", b"one").unwrap();
        store.write_exclusive("a", b"two").unwrap();
        assert_eq!(store.read_all("a").unwrap(), b"two");

        let keys = store.list_keys().unwrap();
        assert_eq!(keys, vec!["a".to_string()]);

        store.remove("a").unwrap();
        assert!(!store.exists("a"));
    }
}
