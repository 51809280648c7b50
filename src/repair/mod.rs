//! Reconciliation between transcripts, metadata documents and the index.

/// Reconciliation pass.
pub mod engine;
/// Pass outcome.
pub mod report;

pub use engine::RepairEngine;
pub use report::{Finding, RepairReport};
