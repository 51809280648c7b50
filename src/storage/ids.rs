//! Conversation id allocation.
//!
//! Ids are second-resolution local timestamps (`YYYY-MM-DD_HH-MM-SS`). Two
//! conversations created within the same second, or a timestamp whose
//! canonical files already exist on disk, get a monotonic `-N` suffix.

use std::sync::{Mutex, PoisonError};

use crate::storage::clock::id_stamp;
use crate::storage::paths::StorageLayout;

#[derive(Debug, Default)]
struct LastIssued {
    base: String,
    next_suffix: u32,
}

/// Allocates unique conversation ids for one repository.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: Mutex<LastIssued>,
}

impl IdAllocator {
    /// Create an allocator with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id from the current time.
    #[must_use]
    pub fn allocate(&self, layout: &StorageLayout) -> String {
        self.allocate_from(&id_stamp(), layout)
    }

    /// Allocate an id derived from `base`, skipping ids already issued by
    /// this allocator or whose canonical files exist.
    #[must_use]
    pub fn allocate_from(&self, base: &str, layout: &StorageLayout) -> String {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        let mut suffix = if last.base == base { last.next_suffix } else { 0 };
        loop {
            let candidate = if suffix == 0 {
                base.to_string()
            } else {
                format!("{base}-{suffix}")
            };
            suffix += 1;

            if layout.transcript_path(&candidate).exists()
                || layout.metadata_path(&candidate).exists()
            {
                continue;
            }

            last.base = base.to_string();
            last.next_suffix = suffix;
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::StorageConfig;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> StorageLayout {
        StorageLayout::from_config(&StorageConfig::in_dir(dir.path()))
    }

    #[test]
    fn test_same_second_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let ids = IdAllocator::new();

        let base = "2025-01-02_03-04-05";
        assert_eq!(ids.allocate_from(base, &layout), base);
        assert_eq!(ids.allocate_from(base, &layout), "2025-01-02_03-04-05-1");
        assert_eq!(ids.allocate_from(base, &layout), "2025-01-02_03-04-05-2");
        assert_eq!(
            ids.allocate_from("2025-01-02_03-04-06", &layout),
            "2025-01-02_03-04-06"
        );
    }

    #[test]
    fn test_existing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let base = "2025-01-02_03-04-05";
        fs::write(layout.transcript_path(base), "").unwrap();
        fs::write(layout.metadata_path("2025-01-02_03-04-05-1"), "{}").unwrap();

        let ids = IdAllocator::new();
        assert_eq!(ids.allocate_from(base, &layout), "2025-01-02_03-04-05-2");
    }

    #[test]
    fn test_rapid_allocation_is_unique() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let ids = IdAllocator::new();

        let issued: HashSet<String> = (0..50).map(|_| ids.allocate(&layout)).collect();
        assert_eq!(issued.len(), 50);
    }
}
