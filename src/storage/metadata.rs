//! Per-conversation metadata documents and the shared index.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::storage::atomic::{atomic_write_text, read_text};
use crate::storage::clock::now_stamp;
use crate::storage::config::CorruptionPolicy;
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::paths::StorageLayout;

/// Schema version stamped on every saved index.
pub const INDEX_VERSION: u32 = 1;

/// Metadata of one conversation, also used as an index item.
///
/// Missing string fields deserialize as empty so that damaged documents can
/// still be inspected; unknown fields are carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    /// Conversation id.
    #[serde(default)]
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Transcript file name.
    #[serde(default)]
    pub file: String,
    /// Metadata file name.
    #[serde(default)]
    pub meta: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Last mutation timestamp.
    #[serde(default)]
    pub updated_at: String,
    /// Number of appended messages.
    #[serde(default)]
    pub message_count: u64,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Fields written by other tools.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationMeta {
    /// Fresh metadata with canonical file names for `id`.
    #[must_use]
    pub fn new(
        id: &str,
        title: impl Into<String>,
        layout: &StorageLayout,
        created_at: &str,
        tags: &[String],
    ) -> Self {
        Self {
            id: id.to_string(),
            title: title.into(),
            file: layout.transcript_name(id),
            meta: layout.metadata_name(id),
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
            message_count: 0,
            tags: tags.to_vec(),
            extra: Map::new(),
        }
    }

    /// Whether `file` and `meta` both hold the canonical names for `id`.
    #[must_use]
    pub fn has_canonical_names(&self, layout: &StorageLayout) -> bool {
        self.file == layout.transcript_name(&self.id) && self.meta == layout.metadata_name(&self.id)
    }
}

/// The index document (`{version, updated_at, items}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Last save timestamp.
    #[serde(default)]
    pub updated_at: String,
    /// One summary per conversation.
    #[serde(default)]
    pub items: Vec<ConversationMeta>,
    /// Fields written by other tools.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const fn default_version() -> u32 {
    INDEX_VERSION
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            updated_at: now_stamp(),
            items: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl IndexDocument {
    /// Find the item for `id`.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ConversationMeta> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Find the item for `id` mutably.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut ConversationMeta> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Remove every item for `id`, returning whether any was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    /// Sort items by `updated_at`, most recent first.
    pub fn sort_by_recent(&mut self) {
        sort_by_recent(&mut self.items);
    }
}

/// Sort metadata by `updated_at`, most recent first.
pub fn sort_by_recent(items: &mut [ConversationMeta]) {
    items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Reads and writes metadata documents and the index.
///
/// Callers hold the relevant locks; this type only does I/O.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    layout: Arc<StorageLayout>,
    policy: CorruptionPolicy,
}

impl MetadataStore {
    /// Create a store over `layout`.
    #[must_use]
    pub const fn new(layout: Arc<StorageLayout>, policy: CorruptionPolicy) -> Self {
        Self { layout, policy }
    }

    /// Storage layout.
    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Configured corruption policy.
    #[must_use]
    pub const fn policy(&self) -> CorruptionPolicy {
        self.policy
    }

    /// Read the metadata of `id`, `None` when absent.
    ///
    /// An unparseable document counts as absent under
    /// [`CorruptionPolicy::Recover`].
    ///
    /// # Errors
    /// Returns an error on I/O failure, or on a corrupt document under
    /// [`CorruptionPolicy::Fail`].
    pub fn read_meta(&self, id: &str) -> StorageResult<Option<ConversationMeta>> {
        match self.try_read_meta(id) {
            Err(StorageError::Corrupt { path, reason })
                if self.policy == CorruptionPolicy::Recover =>
            {
                warn!(id, path = %path.display(), %reason, "Unreadable metadata treated as absent");
                Ok(None)
            }
            other => other,
        }
    }

    /// Read the metadata of `id` without applying the corruption policy.
    ///
    /// # Errors
    /// Returns [`StorageError::Corrupt`] for unparseable documents and I/O
    /// errors otherwise.
    pub fn try_read_meta(&self, id: &str) -> StorageResult<Option<ConversationMeta>> {
        read_json(&self.layout.metadata_path(id))
    }

    /// Read a metadata-shaped file by name without applying the policy.
    ///
    /// # Errors
    /// Returns [`StorageError::Corrupt`] for unparseable documents and I/O
    /// errors otherwise.
    pub fn read_meta_file(&self, name: &str) -> StorageResult<Option<ConversationMeta>> {
        read_json(&self.layout.file(name))
    }

    /// Atomically write the metadata of `id`.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn write_meta(&self, id: &str, meta: &ConversationMeta) -> StorageResult<()> {
        write_json(&self.layout.metadata_path(id), meta)
    }

    /// Load the index, creating an empty one when absent.
    ///
    /// An unparseable index is replaced by an empty one under
    /// [`CorruptionPolicy::Recover`].
    ///
    /// # Errors
    /// Returns an error on I/O failure, or on a corrupt index under
    /// [`CorruptionPolicy::Fail`].
    pub fn load_index(&self) -> StorageResult<IndexDocument> {
        match self.peek_index() {
            Ok(Some(index)) => Ok(index),
            Ok(None) => {
                let mut index = IndexDocument::default();
                self.save_index(&mut index)?;
                debug!(path = %self.layout.index_path().display(), "Created empty index");
                Ok(index)
            }
            Err(StorageError::Corrupt { path, reason })
                if self.policy == CorruptionPolicy::Recover =>
            {
                warn!(path = %path.display(), %reason, "Unreadable index recreated empty");
                let mut index = IndexDocument::default();
                self.save_index(&mut index)?;
                Ok(index)
            }
            Err(err) => Err(err),
        }
    }

    /// Read the index without creating or repairing it.
    ///
    /// # Errors
    /// Returns [`StorageError::Corrupt`] for an unparseable index and I/O
    /// errors otherwise.
    pub fn peek_index(&self) -> StorageResult<Option<IndexDocument>> {
        read_json(&self.layout.index_path())
    }

    /// Stamp `version` and `updated_at`, then atomically write the index.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save_index(&self, index: &mut IndexDocument) -> StorageResult<()> {
        index.version = INDEX_VERSION;
        index.updated_at = now_stamp();
        write_json(&self.layout.index_path(), index)
    }
}

/// Read and parse a JSON document, `None` when the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let raw = match read_text(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
            return Err(StorageError::Corrupt {
                path: path.to_path_buf(),
                reason: err.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

/// Serialize as pretty JSON and write atomically.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write_text(path, &json)?;
    Ok(())
}
