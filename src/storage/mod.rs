//! File-backed conversation storage.
//!
//! Each conversation is a transcript plus a JSON metadata document, both
//! named after its id, and a summary entry in a shared index document.

/// Atomic file replacement.
pub mod atomic;
/// Timestamp formats.
pub mod clock;
/// Storage configuration.
pub mod config;
/// Error types.
pub mod errors;
/// Conversation id allocation.
pub mod ids;
/// Conversation and index locks.
pub mod locks;
/// Metadata documents and the index.
pub mod metadata;
/// File naming inside the storage directory.
pub mod paths;
/// Reference-document registry.
pub mod registry;
/// Conversation CRUD.
pub mod repository;
/// Transcript block format.
pub mod transcript;

pub use config::{CorruptionPolicy, StorageConfig};
pub use errors::{StorageError, StorageResult};
pub use locks::LockTable;
pub use metadata::{ConversationMeta, IndexDocument, MetadataStore};
pub use paths::StorageLayout;
pub use registry::ReferenceRegistry;
pub use repository::ConversationRepository;
pub use transcript::{Role, TranscriptMessage};
