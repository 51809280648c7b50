//! Reference documents attached to conversations.
//!
//! Stored as `{ "<conversation id>": { "reference_docs": [<absolute path>, ...] } }`
//! next to the index. The registry has its own lifecycle: entries are
//! created with a conversation and pruned when it is deleted. Every access
//! holds the storage directory's maintenance gate shared, so a repair pass
//! never sweeps a registry write in flight.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLockReadGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::config::CorruptionPolicy;
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::locks::{LockTable, lock};
use crate::storage::metadata::{read_json, write_json};

/// Registry entry of one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Absolute paths of attached documents, in attachment order.
    #[serde(default)]
    pub reference_docs: Vec<String>,
}

type RegistryMap = BTreeMap<String, RegistryEntry>;

/// File-backed registry of reference documents per conversation.
#[derive(Debug)]
pub struct ReferenceRegistry {
    path: PathBuf,
    policy: CorruptionPolicy,
    locks: Arc<LockTable>,
    guard: Mutex<()>,
}

impl ReferenceRegistry {
    /// Create a registry stored at `path`, sharing `locks` with the
    /// repository of the same directory.
    #[must_use]
    pub const fn new(path: PathBuf, policy: CorruptionPolicy, locks: Arc<LockTable>) -> Self {
        Self {
            path,
            policy,
            locks,
            guard: Mutex::new(()),
        }
    }

    /// Registry file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attach `doc_path` to `id`, stored as an absolute path, once.
    ///
    /// # Errors
    /// Returns a validation error for an empty id, or an I/O error.
    pub fn add_reference_doc(&self, id: &str, doc_path: &Path) -> StorageResult<()> {
        if id.trim().is_empty() {
            return Err(StorageError::Validation(
                "conversation id is empty".to_string(),
            ));
        }
        let absolute = std::path::absolute(doc_path)?;
        let absolute = absolute.to_string_lossy().into_owned();

        let _guard = self.lock();
        let mut registry = self.load()?;
        let entry = registry.entry(id.to_string()).or_default();
        if entry.reference_docs.contains(&absolute) {
            return Ok(());
        }
        entry.reference_docs.push(absolute);
        self.save(&registry)?;
        debug!(id, doc = %doc_path.display(), "Reference document attached");
        Ok(())
    }

    /// Documents attached to `id`, empty for unknown or empty ids.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be read.
    pub fn reference_docs(&self, id: &str) -> StorageResult<Vec<String>> {
        if id.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.lock();
        Ok(self
            .load()?
            .remove(id)
            .map(|entry| entry.reference_docs)
            .unwrap_or_default())
    }

    /// Create an empty entry for `id` if none exists.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be read or written.
    pub fn ensure(&self, id: &str) -> StorageResult<()> {
        let _guard = self.lock();
        let mut registry = self.load()?;
        if registry.contains_key(id) {
            return Ok(());
        }
        registry.insert(id.to_string(), RegistryEntry::default());
        self.save(&registry)
    }

    /// Drop the entry for `id`, returning whether one existed.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be read or written.
    pub fn remove(&self, id: &str) -> StorageResult<bool> {
        let _guard = self.lock();
        let mut registry = self.load()?;
        if registry.remove(id).is_none() {
            return Ok(false);
        }
        self.save(&registry)?;
        Ok(true)
    }

    /// Replace the registry with an empty document.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be written.
    pub fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock();
        self.save(&RegistryMap::new())
    }

    fn lock(&self) -> (RwLockReadGuard<'_, ()>, MutexGuard<'_, ()>) {
        (self.locks.shared(), lock(&self.guard))
    }

    fn load(&self) -> StorageResult<RegistryMap> {
        match read_json(&self.path) {
            Ok(registry) => Ok(registry.unwrap_or_default()),
            Err(StorageError::Corrupt { path, reason })
                if self.policy == CorruptionPolicy::Recover =>
            {
                warn!(path = %path.display(), %reason, "Unreadable registry treated as empty");
                Ok(RegistryMap::new())
            }
            Err(err) => Err(err),
        }
    }

    fn save(&self, registry: &RegistryMap) -> StorageResult<()> {
        write_json(&self.path, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> ReferenceRegistry {
        ReferenceRegistry::new(
            dir.path().join("attached_docs.json"),
            CorruptionPolicy::Recover,
            Arc::new(LockTable::new()),
        )
    }

    #[test]
    fn test_add_stores_absolute_path_once() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let doc = dir.path().join("notes.md");

        registry.add_reference_doc("c1", &doc).unwrap();
        registry.add_reference_doc("c1", &doc).unwrap();

        let docs = registry.reference_docs("c1").unwrap();
        assert_eq!(docs, vec![doc.to_string_lossy().into_owned()]);
        assert!(Path::new(&docs[0]).is_absolute());
    }

    #[test]
    fn test_relative_path_made_absolute() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry
            .add_reference_doc("c1", Path::new("docs/brief.txt"))
            .unwrap();

        let docs = registry.reference_docs("c1").unwrap();
        assert!(Path::new(&docs[0]).is_absolute());
        assert!(docs[0].ends_with("brief.txt"));
    }

    #[test]
    fn test_file_format() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.ensure("c1").unwrap();

        let raw = fs::read_to_string(registry.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({"c1": {"reference_docs": []}}));
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.ensure("c1").unwrap();
        registry.ensure("c2").unwrap();

        assert!(registry.remove("c1").unwrap());
        assert!(!registry.remove("c1").unwrap());
        assert!(registry.reference_docs("c1").unwrap().is_empty());

        registry.clear().unwrap();
        let raw = fs::read_to_string(registry.path()).unwrap();
        assert_eq!(raw.trim(), "{}");
    }

    #[test]
    fn test_empty_id_rejected() {
        let dir = TempDir::new().unwrap();
        let err = registry(&dir)
            .add_reference_doc(" ", Path::new("a.txt"))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(registry(&dir).reference_docs("").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_registry_policies() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("attached_docs.json"), "nope").unwrap();

        assert!(registry(&dir).reference_docs("c1").unwrap().is_empty());

        let strict = ReferenceRegistry::new(
            dir.path().join("attached_docs.json"),
            CorruptionPolicy::Fail,
            Arc::new(LockTable::new()),
        );
        assert!(matches!(
            strict.reference_docs("c1"),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
