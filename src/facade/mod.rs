//! Front-end API over the repository and the reference-document registry.

/// Conversation manager.
pub mod manager;

pub use manager::ConversationManager;
