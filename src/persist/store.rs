//! The durable storage seam.
//!
//! The engine treats storage as an opaque key-value surface; hosts provide
//! whatever backs it (browser storage, a config directory, a test double).

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    Quota,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub trait Storage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
    /// Keys starting with `prefix`, in sorted order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory storage with an optional quota, mirroring the quota-limited
/// key-value stores dashboards usually persist into.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, Vec<u8>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn used_bytes_without(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(entry_key, _)| entry_key.as_str() != key)
            .map(|(entry_key, value)| entry_key.len() + value.len())
            .sum()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            if self.used_bytes_without(key) + key.len() + value.len() > quota {
                return Err(StorageError::Quota);
            }
        }
        self.entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// File-backed storage: one JSON file per key under a root directory.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Uses the platform data directory for the engine.
    pub fn new() -> Result<Self, StorageError> {
        let dirs = directories::ProjectDirs::from("", "", "pegboard")
            .context("no home directory available")?;
        Ok(Self::with_root(dirs.data_dir().to_owned()))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys become file names directly; anything path-like is flattened.
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("error reading {path:?}"))
                .into()),
        }
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.root)
            .with_context(|| format!("error creating {:?}", self.root))?;

        // Write to a sibling and rename so a failed write can't truncate the
        // previous document.
        let tmp = path.with_extension("json.new");
        fs::write(&tmp, value).with_context(|| format!("error writing {tmp:?}"))?;
        fs::rename(&tmp, &path).with_context(|| format!("error renaming to {path:?}"))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("error removing {path:?}"))
                .into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("error listing {:?}", self.root))
                    .into())
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(anyhow::Error::new)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(key) = name.strip_suffix(".json") {
                if key.starts_with(prefix) {
                    keys.push(key.to_owned());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trips() {
        let mut storage = MemoryStorage::new();

        storage.write("grid-state", b"hello").unwrap();
        assert_eq!(storage.read("grid-state").unwrap().as_deref(), Some(&b"hello"[..]));

        storage.remove("grid-state").unwrap();
        assert_eq!(storage.read("grid-state").unwrap(), None);
    }

    #[test]
    fn memory_storage_enforces_quota() {
        let mut storage = MemoryStorage::with_quota(32);

        storage.write("a", &[0u8; 16]).unwrap();
        let result = storage.write("b", &[0u8; 32]);
        assert!(matches!(result, Err(StorageError::Quota)));

        // Overwriting an existing key only counts the new value.
        storage.write("a", &[0u8; 20]).unwrap();
    }

    #[test]
    fn memory_storage_lists_by_prefix() {
        let mut storage = MemoryStorage::new();
        storage.write("profile-alpha", b"{}").unwrap();
        storage.write("profile-beta", b"{}").unwrap();
        storage.write("grid-state", b"{}").unwrap();

        assert_eq!(
            storage.list("profile-").unwrap(),
            vec!["profile-alpha".to_owned(), "profile-beta".to_owned()]
        );
    }
}
