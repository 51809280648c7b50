//! CRUD over a conversation's transcript, metadata document and index entry.
//!
//! Every mutation holds the lock table's maintenance gate shared, then the
//! conversation lock, then the index lock, in that order.

use std::fs;
use std::io;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::repair::engine::RepairEngine;
use crate::storage::atomic::{atomic_write_text, read_text};
use crate::storage::clock::now_stamp;
use crate::storage::config::StorageConfig;
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::ids::IdAllocator;
use crate::storage::locks::{LockTable, lock};
use crate::storage::metadata::{ConversationMeta, IndexDocument, MetadataStore, sort_by_recent};
use crate::storage::paths::{StorageLayout, validate_file_name, validate_id};
use crate::storage::transcript::{Role, TranscriptMessage, TranscriptParser, format_block};

/// Conversation storage rooted at one directory.
#[derive(Debug)]
pub struct ConversationRepository {
    layout: Arc<StorageLayout>,
    store: MetadataStore,
    locks: Arc<LockTable>,
    ids: IdAllocator,
    parser: TranscriptParser,
}

impl ConversationRepository {
    /// Build a repository sharing `locks` with other users of the directory.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &StorageConfig, locks: Arc<LockTable>) -> StorageResult<Self> {
        config.validate()?;
        let layout = Arc::new(StorageLayout::from_config(config));
        Ok(Self {
            store: MetadataStore::new(Arc::clone(&layout), config.on_corruption),
            layout,
            locks,
            ids: IdAllocator::new(),
            parser: TranscriptParser::new()?,
        })
    }

    /// Build a repository with its own lock table.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        Self::new(config, Arc::new(LockTable::new()))
    }

    /// Storage layout.
    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Metadata and index store.
    #[must_use]
    pub const fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Lock table shared with the repair engine and the registry.
    #[must_use]
    pub const fn locks(&self) -> &Arc<LockTable> {
        &self.locks
    }

    /// Reconciliation engine sharing this repository's locks.
    #[must_use]
    pub fn reconciler(&self) -> RepairEngine {
        RepairEngine::new(self.store.clone(), Arc::clone(&self.locks))
    }

    /// Create a conversation with an empty transcript.
    ///
    /// A blank title falls back to the allocated id.
    ///
    /// # Errors
    /// Returns an error if any file cannot be written.
    pub fn create(&self, title: &str, tags: &[String]) -> StorageResult<ConversationMeta> {
        let _gate = self.locks.shared();
        self.layout.ensure_dir()?;

        let id = self.ids.allocate(&self.layout);
        let title = match title.trim() {
            "" => id.clone(),
            trimmed => trimmed.to_string(),
        };
        let meta = ConversationMeta::new(&id, title, &self.layout, &now_stamp(), tags);

        let handle = self.locks.conversation(&id);
        let _conversation = lock(&handle);
        atomic_write_text(&self.layout.transcript_path(&id), "")?;
        self.store.write_meta(&id, &meta)?;

        let _index = self.locks.index();
        let mut index = self.store.load_index()?;
        index.items.push(meta.clone());
        self.store.save_index(&mut index)?;

        info!(id = %id, title = %meta.title, "Conversation created");
        Ok(meta)
    }

    /// Append one message and bump `updated_at` and `message_count`.
    ///
    /// Roles other than `assistant` (or the legacy `ai`) are stored as
    /// `user`. The whole transcript is rewritten atomically, after the
    /// metadata has been read, so a failed read leaves the transcript as is.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the transcript does not exist,
    /// [`StorageError::Corrupt`] for unreadable metadata under
    /// [`crate::storage::config::CorruptionPolicy::Fail`], or an error if a
    /// write fails.
    pub fn append_message(&self, id: &str, role: &str, text: &str) -> StorageResult<()> {
        validate_id(id)?;
        let role = Role::normalize(role);

        let _gate = self.locks.shared();
        let handle = self.locks.conversation(id);
        let _conversation = lock(&handle);

        let path = self.layout.transcript_path(id);
        let mut content = match read_text(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::conversation_not_found(id));
            }
            Err(err) => return Err(err.into()),
        };
        let stamp = now_stamp();
        let mut meta = if let Some(meta) = self.store.read_meta(id)? {
            meta
        } else {
            warn!(id, "Metadata missing on append, rebuilding it");
            ConversationMeta::new(id, id, &self.layout, &stamp, &[])
        };

        content.push_str(&format_block(&stamp, role, text));
        atomic_write_text(&path, &content)?;

        meta.updated_at.clone_from(&stamp);
        meta.message_count += 1;
        self.store.write_meta(id, &meta)?;

        let _index = self.locks.index();
        let mut index = self.store.load_index()?;
        if let Some(item) = index.find_mut(id) {
            item.updated_at = stamp;
            item.message_count += 1;
            self.store.save_index(&mut index)?;
        } else {
            debug!(id, "Conversation absent from the index, entry left to repair");
        }

        debug!(id, role = %role, chars = text.chars().count(), "Message appended");
        Ok(())
    }

    /// Full transcript text.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the transcript does not exist.
    pub fn read_text(&self, id: &str) -> StorageResult<String> {
        validate_id(id)?;
        match read_text(&self.layout.transcript_path(id)) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::conversation_not_found(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Transcript parsed into messages, in append order.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the transcript does not exist.
    pub fn messages(&self, id: &str) -> StorageResult<Vec<TranscriptMessage>> {
        Ok(self.parser.parse(&self.read_text(id)?))
    }

    /// Metadata document of `id`.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if there is no readable metadata.
    pub fn metadata(&self, id: &str) -> StorageResult<ConversationMeta> {
        validate_id(id)?;
        self.store
            .read_meta(id)?
            .ok_or_else(|| StorageError::NotFound(format!("metadata of conversation {id}")))
    }

    /// Index items, most recently updated first.
    ///
    /// # Errors
    /// Returns an error if the index cannot be loaded.
    pub fn list(&self) -> StorageResult<Vec<ConversationMeta>> {
        let _gate = self.locks.shared();
        let mut items = {
            let _index = self.locks.index();
            self.store.load_index()?.items
        };
        sort_by_recent(&mut items);
        Ok(items)
    }

    /// Change the title in the metadata and the index entry.
    ///
    /// # Errors
    /// Returns [`StorageError::Validation`] for a blank title and
    /// [`StorageError::NotFound`] if the metadata or index entry is missing.
    pub fn rename_title(&self, id: &str, new_title: &str) -> StorageResult<ConversationMeta> {
        let title = new_title.trim();
        if title.is_empty() {
            return Err(StorageError::Validation("title is empty".to_string()));
        }
        validate_id(id)?;

        let _gate = self.locks.shared();
        let handle = self.locks.conversation(id);
        let _conversation = lock(&handle);

        let mut meta = self
            .store
            .read_meta(id)?
            .ok_or_else(|| StorageError::NotFound(format!("metadata of conversation {id}")))?;

        let _index = self.locks.index();
        let mut index = self.store.load_index()?;
        let Some(item) = index.find_mut(id) else {
            return Err(StorageError::NotFound(format!("index entry of conversation {id}")));
        };

        let stamp = now_stamp();
        meta.title = title.to_string();
        meta.updated_at.clone_from(&stamp);
        item.title = title.to_string();
        item.updated_at = stamp;

        self.store.write_meta(id, &meta)?;
        self.store.save_index(&mut index)?;

        info!(id, title, "Conversation renamed");
        Ok(meta)
    }

    /// Title the conversation after the first non-empty line of its first
    /// user message, or after its id when there is none.
    ///
    /// # Errors
    /// Returns an error if the transcript cannot be read or the rename fails.
    pub fn retitle_from_first_user_line(&self, id: &str) -> StorageResult<String> {
        let raw = self.read_text(id)?;
        let title = self
            .parser
            .first_user_line(&raw)
            .unwrap_or_else(|| id.to_string());
        self.rename_title(id, &title)?;
        Ok(title)
    }

    /// Remove both files and the index entry.
    ///
    /// A transcript renamed through the legacy API is removed too.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if nothing existed for `id`, or
    /// the first removal error.
    pub fn delete(&self, id: &str) -> StorageResult<()> {
        validate_id(id)?;

        let _gate = self.locks.shared();
        let handle = self.locks.conversation(id);
        let _conversation = lock(&handle);

        let mut targets = vec![self.layout.transcript_name(id), self.layout.metadata_name(id)];
        // Never another conversation's canonical transcript.
        let renamed = self
            .store
            .try_read_meta(id)
            .ok()
            .flatten()
            .map(|meta| meta.file)
            .filter(|file| {
                !targets.contains(file)
                    && !self.layout.is_reserved(file)
                    && validate_file_name(file).is_ok()
                    && self
                        .layout
                        .id_from_transcript_name(file)
                        .is_none_or(|owner| owner == id)
            });
        targets.extend(renamed);

        let mut existed = false;
        for name in &targets {
            let path = self.layout.file(name);
            match fs::remove_file(&path) {
                Ok(()) => existed = true,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        id,
                        path = %path.display(),
                        error = %err,
                        "Failed to remove conversation file"
                    );
                    return Err(err.into());
                }
            }
        }

        let _index = self.locks.index();
        let mut index = self.store.load_index()?;
        if index.remove(id) {
            existed = true;
            self.store.save_index(&mut index)?;
        }

        if !existed {
            return Err(StorageError::conversation_not_found(id));
        }
        info!(id, "Conversation deleted");
        Ok(())
    }

    /// Replace the index with an empty one.
    ///
    /// # Errors
    /// Returns an error if the index cannot be written.
    pub fn reset_index(&self) -> StorageResult<()> {
        let _gate = self.locks.shared();
        let _index = self.locks.index();
        self.store.save_index(&mut IndexDocument::default())
    }

    /// Transcript file names in the storage directory, sorted.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or listed.
    pub fn transcript_files(&self) -> StorageResult<Vec<String>> {
        self.layout.ensure_dir()?;
        let mut names = Vec::new();
        for entry in fs::read_dir(self.layout.root())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(self.layout.transcript_ext()) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Rename a transcript file without touching its metadata file name.
    ///
    /// The metadata and index entry get the new `file` name and a title
    /// taken from the new name's stem; their `meta` field is left alone.
    /// The result is the drift that reconciliation normalizes.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the source file or its metadata
    /// is missing, and [`StorageError::Validation`] if a name is unusable or
    /// the target exists.
    pub fn rename_transcript_file(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> StorageResult<ConversationMeta> {
        validate_file_name(old_name)?;
        validate_file_name(new_name)?;
        if self.layout.is_reserved(new_name) {
            return Err(StorageError::Validation(format!(
                "`{new_name}` is a reserved file name"
            )));
        }
        let id = self
            .layout
            .id_from_transcript_name(old_name)
            .ok_or_else(|| {
                StorageError::Validation(format!(
                    "cannot derive a conversation id from `{old_name}`"
                ))
            })?
            .to_string();

        let _gate = self.locks.shared();
        let handle = self.locks.conversation(&id);
        let _conversation = lock(&handle);

        let old_path = self.layout.file(old_name);
        let new_path = self.layout.file(new_name);
        if !old_path.is_file() {
            return Err(StorageError::NotFound(format!("file {old_name}")));
        }
        if new_path.exists() {
            return Err(StorageError::Validation(format!("`{new_name}` already exists")));
        }
        let mut meta = self
            .store
            .read_meta(&id)?
            .ok_or_else(|| StorageError::NotFound(format!("metadata of conversation {id}")))?;

        fs::rename(&old_path, &new_path)?;

        let title = new_path
            .file_stem()
            .map_or_else(|| new_name.to_string(), |stem| stem.to_string_lossy().into_owned());
        meta.title.clone_from(&title);
        meta.file = new_name.to_string();
        self.store.write_meta(&id, &meta)?;

        let _index = self.locks.index();
        let mut index = self.store.load_index()?;
        if let Some(item) = index.find_mut(&id) {
            item.title = title;
            item.file = new_name.to_string();
            self.store.save_index(&mut index)?;
        }

        info!(id = %id, from = old_name, to = new_name, "Transcript file renamed");
        Ok(meta)
    }

    /// Remove one file from the storage directory by name.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the file does not exist and
    /// [`StorageError::Validation`] for unusable or reserved names.
    pub fn delete_file(&self, name: &str) -> StorageResult<()> {
        validate_file_name(name)?;
        if self.layout.is_reserved(name) {
            return Err(StorageError::Validation(format!(
                "`{name}` is a reserved file name"
            )));
        }

        let _gate = self.locks.shared();
        let path = self.layout.file(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(file = name, "File deleted");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("file {name}")))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::CorruptionPolicy;
    use std::collections::HashMap;
    use std::thread;
    use tempfile::TempDir;

    fn repo(dir: &TempDir) -> ConversationRepository {
        ConversationRepository::open(&StorageConfig::in_dir(dir.path())).unwrap()
    }

    #[test]
    fn test_create_writes_three_representations() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);

        let item = repo.create("Trip", &["travel".to_string()]).unwrap();

        assert_eq!(fs::read_to_string(repo.layout().transcript_path(&item.id)).unwrap(), "");
        let meta = repo.metadata(&item.id).unwrap();
        assert_eq!(meta.title, "Trip");
        assert_eq!(meta.tags, vec!["travel".to_string()]);
        assert!(meta.has_canonical_names(repo.layout()));
        assert_eq!(meta.message_count, 0);

        let listed = repo.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], meta);
    }

    #[test]
    fn test_blank_title_falls_back_to_id() {
        let dir = TempDir::new().unwrap();
        let item = repo(&dir).create("   ", &[]).unwrap();
        assert_eq!(item.title, item.id);
    }

    #[test]
    fn test_rapid_creates_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let first = repo.create("a", &[]).unwrap();
        let second = repo.create("b", &[]).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(repo.list().unwrap().len(), 2);
    }

    #[test]
    fn test_append_roundtrip_preserves_order_and_roles() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("chat", &[]).unwrap();

        repo.append_message(&item.id, "user", "Bonjour").unwrap();
        repo.append_message(&item.id, "assistant", "Salut !\nQue puis-je faire ?").unwrap();
        repo.append_message(&item.id, "system", "coerced").unwrap();

        let messages = repo.messages(&item.id).unwrap();
        let got: Vec<(Role, &str)> = messages
            .iter()
            .map(|message| (message.role, message.text.as_str()))
            .collect();
        assert_eq!(
            got,
            [
                (Role::User, "Bonjour"),
                (Role::Assistant, "Salut !\nQue puis-je faire ?"),
                (Role::User, "coerced"),
            ]
        );

        let raw = repo.read_text(&item.id).unwrap();
        assert!(raw.starts_with('\n'));
        assert!(raw.contains("] USER: Bonjour\n"));
        assert!(raw.contains("] ASSISTANT: Salut !\n"));
    }

    #[test]
    fn test_append_bumps_metadata_and_index() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("chat", &[]).unwrap();

        repo.append_message(&item.id, "user", "one").unwrap();
        repo.append_message(&item.id, "ai", "two").unwrap();

        let meta = repo.metadata(&item.id).unwrap();
        assert_eq!(meta.message_count, 2);
        assert!(meta.updated_at > meta.created_at);
        let listed = repo.list().unwrap();
        assert_eq!(listed[0].message_count, 2);
        assert_eq!(listed[0].updated_at, meta.updated_at);
    }

    #[test]
    fn test_append_to_missing_conversation() {
        let dir = TempDir::new().unwrap();
        let err = repo(&dir)
            .append_message("2025-01-01_00-00-00", "user", "hi")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        assert!(repo.read_text("../index").unwrap_err().is_validation());
        assert!(repo.append_message("", "user", "x").unwrap_err().is_validation());
        assert!(repo.delete("a/b").unwrap_err().is_validation());
    }

    #[test]
    fn test_read_missing_transcript() {
        let dir = TempDir::new().unwrap();
        assert!(repo(&dir).read_text("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_title() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("old", &[]).unwrap();

        let meta = repo.rename_title(&item.id, "  New title ").unwrap();

        assert_eq!(meta.title, "New title");
        assert_eq!(repo.metadata(&item.id).unwrap().title, "New title");
        assert_eq!(repo.list().unwrap()[0].title, "New title");
        assert!(meta.updated_at > item.updated_at);
    }

    #[test]
    fn test_rename_blank_title_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("old", &[]).unwrap();
        let before = fs::read(repo.layout().metadata_path(&item.id)).unwrap();

        let err = repo.rename_title(&item.id, " \t ").unwrap_err();

        assert!(err.is_validation());
        assert_eq!(fs::read(repo.layout().metadata_path(&item.id)).unwrap(), before);
    }

    #[test]
    fn test_rename_requires_metadata_and_index_entry() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        assert!(repo.rename_title("missing", "x").unwrap_err().is_not_found());

        let item = repo.create("old", &[]).unwrap();
        repo.reset_index().unwrap();
        assert!(repo.rename_title(&item.id, "x").unwrap_err().is_not_found());
        assert_eq!(repo.metadata(&item.id).unwrap().title, "old");
    }

    #[test]
    fn test_delete_removes_everything() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let keep = repo.create("keep", &[]).unwrap();
        let gone = repo.create("gone", &[]).unwrap();

        repo.delete(&gone.id).unwrap();

        assert!(!repo.layout().transcript_path(&gone.id).exists());
        assert!(!repo.layout().metadata_path(&gone.id).exists());
        let ids: Vec<String> = repo.list().unwrap().into_iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![keep.id]);
        assert!(repo.delete(&gone.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_retitle_from_first_user_line() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("", &[]).unwrap();

        assert_eq!(repo.retitle_from_first_user_line(&item.id).unwrap(), item.id);

        repo.append_message(&item.id, "assistant", "Hello").unwrap();
        repo.append_message(&item.id, "user", "\n   \nBook a train to Lyon\nplease").unwrap();
        assert_eq!(
            repo.retitle_from_first_user_line(&item.id).unwrap(),
            "Book a train to Lyon"
        );
        assert_eq!(repo.metadata(&item.id).unwrap().title, "Book a train to Lyon");
    }

    #[test]
    fn test_concurrent_appends_are_serialized() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(repo(&dir));
        let item = repo.create("busy", &[]).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let repo = Arc::clone(&repo);
                let id = item.id.clone();
                thread::spawn(move || {
                    for n in 0..10 {
                        repo.append_message(&id, "user", &format!("w{worker} m{n}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(repo.messages(&item.id).unwrap().len(), 40);
        assert_eq!(repo.metadata(&item.id).unwrap().message_count, 40);
        assert_eq!(repo.list().unwrap()[0].message_count, 40);
    }

    #[test]
    fn test_concurrent_conversations_keep_every_index_update() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(repo(&dir));

        let handles: Vec<_> = (0..6_u64)
            .map(|worker| {
                let repo = Arc::clone(&repo);
                thread::spawn(move || {
                    let id = repo.create(&format!("worker {worker}"), &[]).unwrap().id;
                    for n in 0..=worker {
                        repo.append_message(&id, "user", &format!("m{n}")).unwrap();
                    }
                    (id, worker + 1)
                })
            })
            .collect();
        let expected: HashMap<String, u64> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(expected.len(), 6);
        let items = repo.list().unwrap();
        assert_eq!(items.len(), 6);
        for item in items {
            assert_eq!(item.message_count, expected[&item.id], "{}", item.id);
            assert_eq!(repo.metadata(&item.id).unwrap().message_count, expected[&item.id]);
        }
    }

    #[test]
    fn test_append_with_unreadable_metadata_leaves_transcript_alone() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            on_corruption: CorruptionPolicy::Fail,
            ..StorageConfig::in_dir(dir.path())
        };
        let repo = ConversationRepository::open(&config).unwrap();
        let item = repo.create("strict", &[]).unwrap();
        fs::write(repo.layout().metadata_path(&item.id), "garbage").unwrap();
        let before = fs::read(repo.layout().transcript_path(&item.id)).unwrap();

        let err = repo.append_message(&item.id, "user", "hello").unwrap_err();

        assert!(matches!(err, StorageError::Corrupt { .. }));
        assert_eq!(fs::read(repo.layout().transcript_path(&item.id)).unwrap(), before);
        assert_eq!(repo.list().unwrap()[0].message_count, 0);
    }

    #[test]
    fn test_legacy_rename_leaves_meta_name_untouched() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("t", &[]).unwrap();
        let old_name = repo.layout().transcript_name(&item.id);

        let meta = repo.rename_transcript_file(&old_name, "Holiday plans.txt").unwrap();

        assert!(dir.path().join("Holiday plans.txt").exists());
        assert!(!dir.path().join(&old_name).exists());
        assert_eq!(meta.title, "Holiday plans");
        assert_eq!(meta.file, "Holiday plans.txt");
        assert_eq!(meta.meta, repo.layout().metadata_name(&item.id));
        assert_eq!(repo.list().unwrap()[0].file, "Holiday plans.txt");
    }

    #[test]
    fn test_legacy_rename_errors() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("t", &[]).unwrap();
        let name = repo.layout().transcript_name(&item.id);
        fs::write(dir.path().join("taken.txt"), "x").unwrap();

        assert!(repo.rename_transcript_file(&name, "taken.txt").unwrap_err().is_validation());
        assert!(repo.rename_transcript_file("notes.txt", "b.txt").unwrap_err().is_validation());
        assert!(
            repo.rename_transcript_file("conversation_missing.txt", "b.txt")
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_delete_after_legacy_rename_removes_renamed_transcript() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("t", &[]).unwrap();
        let name = repo.layout().transcript_name(&item.id);
        repo.rename_transcript_file(&name, "renamed.txt").unwrap();

        repo.delete(&item.id).unwrap();

        assert!(!dir.path().join("renamed.txt").exists());
    }

    #[test]
    fn test_delete_spares_transcript_of_another_conversation() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let gone = repo.create("gone", &[]).unwrap();
        let kept = repo.create("kept", &[]).unwrap();
        let mut drifted = repo.metadata(&gone.id).unwrap();
        drifted.file = repo.layout().transcript_name(&kept.id);
        repo.store().write_meta(&gone.id, &drifted).unwrap();

        repo.delete(&gone.id).unwrap();

        assert!(!repo.layout().transcript_path(&gone.id).exists());
        assert!(repo.layout().transcript_path(&kept.id).exists());
        assert_eq!(repo.read_text(&kept.id).unwrap(), "");
    }

    #[test]
    fn test_transcript_files_and_delete_file() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let item = repo.create("t", &[]).unwrap();
        fs::write(dir.path().join("a_note.txt"), "x").unwrap();

        let files = repo.transcript_files().unwrap();
        assert_eq!(files, vec!["a_note.txt".to_string(), repo.layout().transcript_name(&item.id)]);

        repo.delete_file("a_note.txt").unwrap();
        assert!(repo.delete_file("a_note.txt").unwrap_err().is_not_found());
        assert!(repo.delete_file("index.json").unwrap_err().is_validation());
    }
}
