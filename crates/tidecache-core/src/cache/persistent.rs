//! Persistent key/value backends for the slow cache tier.
//!
//! The cache only needs get/set/remove and key enumeration. Backends may
//! reject writes when they run out of room; the cache treats that as a
//! skipped persist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;
}

/// Stores each key as one JSON file in a directory.
///
/// File names are the hex SHA-256 of the key, so any key length and
/// character set maps to a valid fixed-length name. The key itself is kept
/// inside the file next to the value.
pub struct FileStore {
    dir: PathBuf,
}

const FILE_EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct StoredFile {
    key: String,
    value: String,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(hasher.finalize()), FILE_EXTENSION))
    }

    fn read_file(path: &Path) -> Result<Option<StoredFile>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let stored = Self::read_file(&self.path_for(key))
            .with_context(|| format!("Failed to read cache file for {}", key))?;
        Ok(stored.filter(|f| f.key == key).map(|f| f.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let contents = serde_json::to_string(&StoredFile {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        std::fs::write(self.path_for(key), contents)
            .with_context(|| format!("Failed to write cache file for {}", key))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove cache file for {}", key)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list cache directory: {}", self.dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            match Self::read_file(&path)? {
                Some(stored) => keys.push(stored.key),
                None => debug!(file = %path.display(), "Skipping foreign file in cache directory"),
            }
        }
        Ok(keys)
    }
}

/// Process-local backend, mostly for tests. An optional byte ceiling makes
/// writes fail the way a full browser/disk store would.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_bytes(capacity_bytes: usize) -> Self {
        Self {
            items: Mutex::default(),
            capacity_bytes: Some(capacity_bytes),
        }
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(capacity) = self.capacity_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if used + value.len() > capacity {
                bail!("Storage quota exceeded writing {}", key);
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.keys().cloned().collect())
    }
}
