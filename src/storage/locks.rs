//! Intra-process mutual exclusion for conversation files and the index.
//!
//! Acquisition order is fixed: maintenance gate, then conversation lock,
//! then index lock. Ordinary mutations hold the gate shared; a repair pass
//! holds it exclusively. Nothing here coordinates with other processes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;

/// Lock table owned by a repository and shared with its repair engine.
#[derive(Debug, Default)]
pub struct LockTable {
    gate: RwLock<()>,
    index: Mutex<()>,
    conversations: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the maintenance gate shared (ordinary mutations).
    pub fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold the maintenance gate exclusively (repair passes).
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold the index lock.
    pub fn index(&self) -> MutexGuard<'_, ()> {
        lock(&self.index)
    }

    /// Lock handle for one conversation, created on first use and kept for
    /// the lifetime of the table.
    #[must_use]
    pub fn conversation(&self, id: &str) -> Arc<Mutex<()>> {
        // The shard guard of `entry` serializes lazy creation per key.
        Arc::clone(
            self.conversations
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Number of conversation locks created so far.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
