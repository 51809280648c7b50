//! Entry point used by front-ends.
//!
//! The modern API addresses conversations by id. The legacy API addresses
//! them by transcript path or file name and derives the id from the name,
//! so it only works for canonically named transcripts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::repair::report::RepairReport;
use crate::storage::clock::id_stamp;
use crate::storage::config::StorageConfig;
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::metadata::ConversationMeta;
use crate::storage::registry::ReferenceRegistry;
use crate::storage::repository::ConversationRepository;
use crate::storage::transcript::TranscriptMessage;

/// Conversation storage plus the reference-document registry.
#[derive(Debug)]
pub struct ConversationManager {
    config: StorageConfig,
    repository: ConversationRepository,
    registry: ReferenceRegistry,
}

impl ConversationManager {
    /// Open the store described by `config`.
    ///
    /// When `repair_on_open` is set a reconciliation pass runs first; its
    /// failure is logged and does not prevent opening.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        config.validate()?;
        let repository = ConversationRepository::open(&config)?;
        let registry = ReferenceRegistry::new(
            repository.layout().registry_path(),
            config.on_corruption,
            Arc::clone(repository.locks()),
        );
        let manager = Self {
            config,
            repository,
            registry,
        };

        if manager.config.repair_on_open {
            match manager.repair(manager.config.repair_safe_mode) {
                Ok(report) => debug!(%report, "Open-time repair done"),
                Err(err) => warn!(error = %err, "Open-time repair failed"),
            }
        }
        Ok(manager)
    }

    /// Open the store configured from the process environment.
    ///
    /// # Errors
    /// Returns an error if an environment override is invalid.
    pub fn from_env() -> StorageResult<Self> {
        Self::open(StorageConfig::from_env()?)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Underlying repository.
    #[must_use]
    pub const fn repository(&self) -> &ConversationRepository {
        &self.repository
    }

    /// Run a reconciliation pass.
    ///
    /// # Errors
    /// See [`crate::repair::RepairEngine::run`].
    pub fn repair(&self, safe_mode: bool) -> StorageResult<RepairReport> {
        self.repository.reconciler().run(safe_mode)
    }

    // Modern API

    /// Index items, most recently updated first.
    ///
    /// # Errors
    /// Returns an error if the index cannot be loaded.
    pub fn list_conversations(&self) -> StorageResult<Vec<ConversationMeta>> {
        self.repository.list()
    }

    /// Create a conversation and its (empty) registry entry.
    ///
    /// # Errors
    /// Returns an error if a file cannot be written.
    pub fn create_conversation(
        &self,
        title: &str,
        tags: &[String],
    ) -> StorageResult<ConversationMeta> {
        let item = self.repository.create(title, tags)?;
        self.registry.ensure(&item.id)?;
        Ok(item)
    }

    /// Append a message to conversation `id`.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] for an unknown conversation.
    pub fn append_message(&self, id: &str, role: &str, text: &str) -> StorageResult<()> {
        self.repository.append_message(id, role, text)
    }

    /// Full transcript of `id`.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] for an unknown conversation.
    pub fn read_conversation_text(&self, id: &str) -> StorageResult<String> {
        self.repository.read_text(id)
    }

    /// Transcript of `id` split into messages.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] for an unknown conversation.
    pub fn messages(&self, id: &str) -> StorageResult<Vec<TranscriptMessage>> {
        self.repository.messages(id)
    }

    /// Metadata document of `id`.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if there is no readable metadata.
    pub fn metadata(&self, id: &str) -> StorageResult<ConversationMeta> {
        self.repository.metadata(id)
    }

    /// Change the title of `id`.
    ///
    /// # Errors
    /// Returns [`StorageError::Validation`] for a blank title and
    /// [`StorageError::NotFound`] for an unknown conversation.
    pub fn rename_conversation(&self, id: &str, title: &str) -> StorageResult<ConversationMeta> {
        self.repository.rename_title(id, title)
    }

    /// Delete `id` with its files, index entry and registry entry.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] for an unknown conversation.
    pub fn delete_conversation(&self, id: &str) -> StorageResult<()> {
        self.repository.delete(id)?;
        self.registry.remove(id)?;
        Ok(())
    }

    /// Delete every indexed conversation, then reset the index and the
    /// registry. Returns how many conversations were deleted.
    ///
    /// # Errors
    /// Returns the first deletion error other than a missing conversation.
    pub fn delete_all_conversations(&self) -> StorageResult<usize> {
        let mut deleted = 0;
        for item in self.repository.list()? {
            if item.id.is_empty() {
                continue;
            }
            match self.delete_conversation(&item.id) {
                Ok(()) => deleted += 1,
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        self.repository.reset_index()?;
        self.registry.clear()?;
        info!(deleted, "All conversations deleted");
        Ok(deleted)
    }

    /// Retitle `id` after its first user line; returns the new title.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] for an unknown conversation.
    pub fn retitle_from_first_user_line(&self, id: &str) -> StorageResult<String> {
        self.repository.retitle_from_first_user_line(id)
    }

    /// Attach a reference document to `id`.
    ///
    /// # Errors
    /// Returns [`StorageError::Validation`] for an empty id.
    pub fn add_reference_doc(&self, id: &str, doc_path: &Path) -> StorageResult<()> {
        self.registry.add_reference_doc(id, doc_path)
    }

    /// Reference documents attached to `id`.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be read.
    pub fn reference_docs(&self, id: &str) -> StorageResult<Vec<String>> {
        self.registry.reference_docs(id)
    }

    // Legacy API

    /// Create an untitled conversation and return its transcript path.
    ///
    /// # Errors
    /// Returns an error if a file cannot be written.
    pub fn create_new_conversation(&self) -> StorageResult<PathBuf> {
        let title = format!("New conversation {}", id_stamp());
        let item = self.create_conversation(&title, &[])?;
        Ok(self.transcript_path(&item.id))
    }

    /// Append a message to the conversation stored at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::Validation`] if no id can be derived from
    /// the file name.
    pub fn append_message_at(&self, path: &Path, role: &str, text: &str) -> StorageResult<()> {
        let id = self.id_for(path)?;
        self.append_message(&id, role, text)
    }

    /// Transcript of the conversation stored at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::Validation`] if no id can be derived from
    /// the file name.
    pub fn read_conversation_at(&self, path: &Path) -> StorageResult<String> {
        let id = self.id_for(path)?;
        self.read_conversation_text(&id)
    }

    /// Transcript file names in the storage directory, sorted.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed.
    pub fn list_conversation_files(&self) -> StorageResult<Vec<String>> {
        self.repository.transcript_files()
    }

    /// Rename a transcript file, keeping its metadata file name.
    ///
    /// # Errors
    /// See [`ConversationRepository::rename_transcript_file`].
    pub fn rename_conversation_file(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> StorageResult<ConversationMeta> {
        self.repository.rename_transcript_file(old_name, new_name)
    }

    /// Delete one file of the storage directory by name.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the file does not exist.
    pub fn delete_conversation_file(&self, name: &str) -> StorageResult<()> {
        self.repository.delete_file(name)
    }

    /// Attach a reference document to the conversation stored at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::Validation`] if no id can be derived from
    /// the file name.
    pub fn add_reference_doc_at(&self, path: &Path, doc_path: &Path) -> StorageResult<()> {
        let id = self.id_for(path)?;
        self.add_reference_doc(&id, doc_path)
    }

    /// Reference documents of the conversation stored at `path`; empty when
    /// no id can be derived from the name.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be read.
    pub fn reference_docs_at(&self, path: &Path) -> StorageResult<Vec<String>> {
        match self.conversation_id_from_filename(&path.to_string_lossy()) {
            Some(id) => self.reference_docs(&id),
            None => Ok(Vec::new()),
        }
    }

    /// Conversation id encoded in a transcript file name or path.
    #[must_use]
    pub fn conversation_id_from_filename(&self, name: &str) -> Option<String> {
        self.repository
            .layout()
            .id_from_transcript_name(name)
            .map(str::to_string)
    }

    /// Canonical transcript path of `id`.
    #[must_use]
    pub fn transcript_path(&self, id: &str) -> PathBuf {
        self.repository.layout().transcript_path(id)
    }

    fn id_for(&self, path: &Path) -> StorageResult<String> {
        let name = path.to_string_lossy();
        self.conversation_id_from_filename(&name).ok_or_else(|| {
            StorageError::Validation(format!(
                "unexpected file name `{name}`, cannot derive a conversation id"
            ))
        })
    }
}
