//! File-backed conversation storage with self-healing reconciliation.
//!
//! Conversations live in one directory as a plain-text transcript plus a
//! JSON metadata document each, summarized by a shared index document. The
//! [`repair`] pass restores agreement between the three when they drift.

// Forbid unsafe or non-idiomatic practices
#![deny(unsafe_code)] // No unsafe code
#![deny(missing_docs)] // Every public item is documented
#![deny(dead_code)] // No unused code
#![deny(non_camel_case_types)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(unused_must_use)] // Results and Options are handled explicitly
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]
// Clippy discipline
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)] // No unwrap()
#![deny(clippy::expect_used)] // No expect()
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)] // Library code logs through tracing
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::shadow_unrelated)]
#![deny(clippy::too_many_arguments)]
#![deny(clippy::cognitive_complexity)]
#![deny(overflowing_literals)]
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

/// Modern and legacy front-end API.
pub mod facade;
/// Reconciliation between files, metadata and the index.
pub mod repair;
/// Binary bootstrap (tracing, repair runner).
pub mod start;
/// Transcripts, metadata, index, locks and the registry.
#[allow(clippy::option_if_let_else, clippy::missing_const_for_fn)]
pub mod storage;

pub use facade::ConversationManager;
pub use repair::{Finding, RepairEngine, RepairReport};
pub use storage::{
    ConversationMeta, ConversationRepository, CorruptionPolicy, StorageConfig, StorageError,
    StorageResult,
};
