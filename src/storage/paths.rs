//! File layout of the storage directory.
//!
//! Every conversation owns two files whose names derive from its id:
//! `<prefix>_<id><transcript_ext>` and `<prefix>_<id><metadata_ext>`. The
//! directory also holds the index and the reference-document registry,
//! which are the only files never referenced by a conversation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::config::StorageConfig;
use crate::storage::errors::{StorageError, StorageResult};

/// Resolved names and paths inside the storage directory.
#[derive(Clone, Debug)]
pub struct StorageLayout {
    root: PathBuf,
    index_filename: String,
    registry_filename: String,
    prefix: String,
    transcript_ext: String,
    metadata_ext: String,
}

impl StorageLayout {
    /// Build the layout from a validated configuration.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            root: config.root_dir.clone(),
            index_filename: config.index_filename.clone(),
            registry_filename: config.registry_filename.clone(),
            prefix: config.file_prefix.clone(),
            transcript_ext: config.transcript_ext.clone(),
            metadata_ext: config.metadata_ext.clone(),
        }
    }

    /// Storage directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directory if missing.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn ensure_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Canonical transcript file name for `id`.
    #[must_use]
    pub fn transcript_name(&self, id: &str) -> String {
        format!("{}_{id}{}", self.prefix, self.transcript_ext)
    }

    /// Canonical metadata file name for `id`.
    #[must_use]
    pub fn metadata_name(&self, id: &str) -> String {
        format!("{}_{id}{}", self.prefix, self.metadata_ext)
    }

    /// Canonical transcript path for `id`.
    #[must_use]
    pub fn transcript_path(&self, id: &str) -> PathBuf {
        self.root.join(self.transcript_name(id))
    }

    /// Canonical metadata path for `id`.
    #[must_use]
    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.root.join(self.metadata_name(id))
    }

    /// Path of a file name inside the storage directory.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Index document path.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.root.join(&self.index_filename)
    }

    /// Reference-document registry path.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.root.join(&self.registry_filename)
    }

    /// Transcript extension, dot included.
    #[must_use]
    pub fn transcript_ext(&self) -> &str {
        &self.transcript_ext
    }

    /// Whether `name` is the index or the registry (case-insensitive).
    #[must_use]
    pub fn is_reserved(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.index_filename)
            || name.eq_ignore_ascii_case(&self.registry_filename)
    }

    /// Whether `name` looks like a per-conversation metadata file.
    #[must_use]
    pub fn is_metadata_name(&self, name: &str) -> bool {
        name.ends_with(&self.metadata_ext) && !self.is_reserved(name)
    }

    /// Extract the conversation id from a transcript file name or path.
    ///
    /// Returns `None` when the base name does not follow
    /// `<prefix>_<id><transcript_ext>`.
    #[must_use]
    pub fn id_from_transcript_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);
        let id = base
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(self.transcript_ext.as_str())?;
        (!id.is_empty()).then_some(id)
    }
}

/// Reject ids that are empty or could escape the storage directory.
///
/// # Errors
/// Returns a validation error for unusable ids.
pub fn validate_id(id: &str) -> StorageResult<()> {
    if id.trim().is_empty() {
        return Err(StorageError::Validation(
            "conversation id is empty".to_string(),
        ));
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(StorageError::Validation(format!(
            "conversation id `{id}` contains path separators"
        )));
    }
    Ok(())
}

/// Reject file names that are empty or point outside the storage directory.
///
/// # Errors
/// Returns a validation error for unusable names.
pub fn validate_file_name(name: &str) -> StorageResult<()> {
    if name.trim().is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
        return Err(StorageError::Validation(format!(
            "`{name}` is not a plain file name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> StorageLayout {
        StorageLayout::from_config(&StorageConfig::in_dir("/data/chats"))
    }

    #[test]
    fn test_canonical_names() {
        let layout = layout();
        let id = "2025-01-02_03-04-05";
        assert_eq!(
            layout.transcript_name(id),
            "conversation_2025-01-02_03-04-05.txt"
        );
        assert_eq!(
            layout.metadata_name(id),
            "conversation_2025-01-02_03-04-05.json"
        );
        assert_eq!(
            layout.metadata_path(id),
            PathBuf::from("/data/chats/conversation_2025-01-02_03-04-05.json")
        );
    }

    #[test]
    fn test_id_from_transcript_name() {
        let layout = layout();
        assert_eq!(
            layout.id_from_transcript_name("/data/chats/conversation_2025-01-02_03-04-05.txt"),
            Some("2025-01-02_03-04-05")
        );
        assert_eq!(
            layout.id_from_transcript_name("conversation_abc-1.txt"),
            Some("abc-1")
        );
        assert_eq!(layout.id_from_transcript_name("notes.txt"), None);
        assert_eq!(layout.id_from_transcript_name("conversation_.txt"), None);
        assert_eq!(layout.id_from_transcript_name("conversation_x.json"), None);
    }

    #[test]
    fn test_reserved_and_metadata_names() {
        let layout = layout();
        assert!(layout.is_reserved("INDEX.json"));
        assert!(layout.is_reserved("attached_docs.json"));
        assert!(!layout.is_metadata_name("index.json"));
        assert!(layout.is_metadata_name("conversation_x.json"));
        assert!(!layout.is_metadata_name("conversation_x.txt"));
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("2025-01-02_03-04-05").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../etc").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_file_name("custom.txt").is_ok());
        assert!(validate_file_name("dir/custom.txt").is_err());
    }
}
