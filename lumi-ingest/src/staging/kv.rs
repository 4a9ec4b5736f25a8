//! Key-value backends for the staging store
//!
//! String keys to string values with a byte quota. Writes that would exceed
//! the quota fail with [`KvError::QuotaExceeded`] and leave prior contents
//! untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Device-local key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<(), KvError>;

    fn keys(&self) -> Result<Vec<String>, KvError>;

    fn contains(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.get(key)?.is_some())
    }
}

fn validate_key(key: &str) -> Result<(), KvError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(KvError::InvalidKey(key.to_string()))
    }
}

/// One file per key inside a directory
pub struct FsKeyValueStore {
    dir: PathBuf,
    quota_bytes: u64,
    write_lock: Mutex<()>,
}

impl FsKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>, quota_bytes: u64) -> Result<Self, KvError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quota_bytes,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Bytes used by every key except `excluding`
    fn usage_excluding(&self, excluding: &str) -> Result<u64, KvError> {
        let mut used = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name == excluding {
                continue;
            }
            used += entry.metadata()?.len();
        }
        Ok(used)
    }
}

impl KeyValueStore for FsKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        validate_key(key)?;
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().map_err(|_| KvError::Poisoned)?;

        let used = self.usage_excluding(key)?;
        let available = self.quota_bytes.saturating_sub(used);
        let needed = value.len() as u64;
        if needed > available {
            return Err(KvError::QuotaExceeded { needed, available });
        }

        let temp_path = self.dir.join(format!(".{}.tmp", key));
        std::fs::write(&temp_path, value)?;
        std::fs::rename(&temp_path, self.path_for(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().map_err(|_| KvError::Poisoned)?;
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, KvError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory backend, for tests and ephemeral deployments
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: u64,
}

impl MemoryKeyValueStore {
    pub fn new(quota_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(u64::MAX)
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        validate_key(key)?;
        let entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        let used: u64 = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len() as u64)
            .sum();
        let available = self.quota_bytes.saturating_sub(used);
        let needed = value.len() as u64;
        if needed > available {
            return Err(KvError::QuotaExceeded { needed, available });
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, KvError> {
        let entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}
