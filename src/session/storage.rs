//! Client-durable key/value storage for the session entries.
//!
//! Writes and removals take a batch of keys so that a backend can land them together:
//! the file backend rewrites its whole snapshot in one rename, so a crash never leaves a
//! token from one login next to the identity of another.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Store every entry, all or nothing.
    fn set(&self, entries: &[(&str, &str)]) -> Result<(), StorageError>;

    fn remove(&self, keys: &[&str]) -> Result<(), StorageError>;
}

/// Process-local storage; the session is gone when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: RwLock<HashMap<String, String>>,
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> { self.map.read().get(key).cloned() }

    fn set(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut m = self.map.write();
        for (k, v) in entries {
            m.insert(k.to_string(), v.to_string());
        }
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut m = self.map.write();
        for k in keys {
            m.remove(*k);
        }
        Ok(())
    }
}

/// JSON object on disk, rewritten through a temp file + rename on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    map: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the file. An unreadable or corrupt file is treated as empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                Ok(m) => m,
                Err(e) => {
                    warn!(target: "session", "ignoring corrupt session file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        debug!(target: "session", "session file {} loaded with {} entries", path.display(), map.len());
        Self { path, map: RwLock::new(map) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn persist(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() { std::fs::create_dir_all(dir)?; }
        }
        let bytes = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> { self.map.read().get(key).cloned() }

    fn set(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut m = self.map.write();
        let mut next = m.clone();
        for (k, v) in entries {
            next.insert(k.to_string(), v.to_string());
        }
        self.persist(&next)?;
        *m = next;
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut m = self.map.write();
        let mut next = m.clone();
        for k in keys {
            next.remove(*k);
        }
        self.persist(&next)?;
        *m = next;
        Ok(())
    }
}
