//! Reconciliation of the storage directory, metadata documents and index.
//!
//! A pass runs with the maintenance gate held exclusively and the index lock
//! held, so no ordinary mutation interleaves with its renames and deletions.
//! The index is only rewritten when its content changed, which makes a
//! second pass over a repaired directory a byte-for-byte no-op.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::repair::report::{Finding, RepairReport};
use crate::storage::config::CorruptionPolicy;
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::locks::LockTable;
use crate::storage::metadata::{ConversationMeta, IndexDocument, MetadataStore, sort_by_recent};
use crate::storage::paths::{StorageLayout, validate_file_name, validate_id};

/// Runs reconciliation passes over one storage directory.
#[derive(Clone, Debug)]
pub struct RepairEngine {
    store: MetadataStore,
    locks: Arc<LockTable>,
}

impl RepairEngine {
    /// Create an engine sharing `locks` with the repository it repairs.
    #[must_use]
    pub const fn new(store: MetadataStore, locks: Arc<LockTable>) -> Self {
        Self { store, locks }
    }

    /// Run one pass. In safe mode nothing is written, renamed or deleted.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed, the index cannot
    /// be saved, or the index is corrupt under [`CorruptionPolicy::Fail`].
    /// Per-file rename, metadata write and orphan removal failures are
    /// reported as findings instead.
    pub fn run(&self, safe_mode: bool) -> StorageResult<RepairReport> {
        let _gate = self.locks.exclusive();
        let _index = self.locks.index();

        let mut pass = Pass {
            store: &self.store,
            layout: self.store.layout(),
            safe_mode,
            keep: HashSet::new(),
            report: RepairReport::new(safe_mode),
        };
        pass.execute()?;
        let report = pass.report;

        info!(
            safe_mode,
            removed = report.entries_removed,
            meta_corrected = report.meta_corrected,
            renamed = report.files_renamed,
            orphans = report.orphans_swept,
            adopted = report.entries_adopted,
            rebuilt = report.index_rebuilt,
            "Repair pass finished"
        );
        Ok(report)
    }
}

enum MetaState {
    Present(ConversationMeta),
    Missing,
    Unreadable(String),
}

struct Pass<'a> {
    store: &'a MetadataStore,
    layout: &'a StorageLayout,
    safe_mode: bool,
    // On-disk names a safe pass would have renamed; kept out of its sweep.
    keep: HashSet<String>,
    report: RepairReport,
}

impl Pass<'_> {
    fn execute(&mut self) -> StorageResult<()> {
        if !self.layout.root().is_dir() {
            if self.safe_mode {
                debug!(
                    root = %self.layout.root().display(),
                    "Storage directory missing, nothing to inspect"
                );
                return Ok(());
            }
            self.layout.ensure_dir()?;
        }

        let (mut index, index_missing) = self.load_index()?;
        let original = index.items.clone();
        let files = list_files(self.layout.root())?;

        if index.items.is_empty() {
            let mut rebuilt: Vec<ConversationMeta> = self
                .scan_metadata(&files, |_| true)?
                .into_iter()
                .map(|(_, meta)| meta)
                .collect();
            if !rebuilt.is_empty() {
                sort_by_recent(&mut rebuilt);
                info!(entries = rebuilt.len(), "Rebuilding index from metadata files");
                index.items = rebuilt;
                self.report.index_rebuilt = true;
            }
        } else {
            self.adopt(&mut index, &files)?;
        }

        index.items = self.validate_entries(std::mem::take(&mut index.items))?;

        let dirty = index_missing || self.report.index_rebuilt || index.items != original;
        if dirty && !self.safe_mode {
            self.store.save_index(&mut index)?;
            self.report.index_written = true;
        }

        self.sweep_orphans(&index)
    }

    fn load_index(&mut self) -> StorageResult<(IndexDocument, bool)> {
        match self.store.peek_index() {
            Ok(Some(index)) => Ok((index, false)),
            Ok(None) => Ok((IndexDocument::default(), true)),
            Err(StorageError::Corrupt { reason, .. })
                if self.store.policy() == CorruptionPolicy::Recover =>
            {
                self.note(Finding::IndexUnreadable { reason });
                Ok((IndexDocument::default(), true))
            }
            Err(err) => Err(err),
        }
    }

    /// Parse every metadata-shaped file accepted by `wanted`, keeping the
    /// documents that carry `id`, `file` and `meta`.
    fn scan_metadata<F>(
        &mut self,
        files: &BTreeSet<String>,
        wanted: F,
    ) -> StorageResult<Vec<(String, ConversationMeta)>>
    where
        F: Fn(&str) -> bool,
    {
        let mut found = Vec::new();
        for name in files {
            if !self.layout.is_metadata_name(name) || !wanted(name.as_str()) {
                continue;
            }
            match self.store.read_meta_file(name) {
                Ok(Some(meta)) if is_complete(&meta) => found.push((name.clone(), meta)),
                Ok(Some(_)) => self.note(Finding::MetadataIncomplete { file: name.clone() }),
                Ok(None) => {}
                Err(StorageError::Corrupt { reason, .. }) => {
                    self.note(Finding::MetadataUnreadable {
                        file: name.clone(),
                        reason,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(found)
    }

    /// Add back conversations whose canonical metadata and transcript exist
    /// but which the index does not list.
    fn adopt(&mut self, index: &mut IndexDocument, files: &BTreeSet<String>) -> StorageResult<()> {
        let known: HashSet<String> = index.items.iter().map(|item| item.id.clone()).collect();
        let referenced: HashSet<String> = index
            .items
            .iter()
            .flat_map(|item| [item.meta.clone(), self.layout.metadata_name(&item.id)])
            .collect();

        let mut adopted = Vec::new();
        for (name, meta) in self.scan_metadata(files, |name| !referenced.contains(name))? {
            if known.contains(&meta.id) || name != self.layout.metadata_name(&meta.id) {
                continue;
            }
            let has_transcript = (validate_file_name(&meta.file).is_ok()
                && self.layout.file(&meta.file).is_file())
                || self.layout.transcript_path(&meta.id).is_file();
            if !has_transcript {
                continue;
            }
            self.note(Finding::Adopted {
                id: meta.id.clone(),
            });
            adopted.push(meta);
        }

        sort_by_recent(&mut adopted);
        self.report.entries_adopted += adopted.len();
        index.items.extend(adopted);
        Ok(())
    }

    fn validate_entries(
        &mut self,
        items: Vec<ConversationMeta>,
    ) -> StorageResult<Vec<ConversationMeta>> {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(items.len());

        for entry in items {
            if !Self::is_usable(&entry) {
                self.report.entries_removed += 1;
                self.note(Finding::InvalidEntry {
                    id: entry.id,
                    file: entry.file,
                });
                continue;
            }
            if !seen.insert(entry.id.clone()) {
                self.report.entries_removed += 1;
                self.note(Finding::DuplicateEntry { id: entry.id });
                continue;
            }
            if let Some(entry) = self.reconcile_entry(entry)? {
                kept.push(entry);
            }
        }
        Ok(kept)
    }

    fn reconcile_entry(
        &mut self,
        mut entry: ConversationMeta,
    ) -> StorageResult<Option<ConversationMeta>> {
        let before = entry.clone();
        let id = entry.id.clone();
        let canonical_file = self.layout.transcript_name(&id);
        let meta_state = self.read_meta_state(&id)?;

        let Some(found) = self.locate_transcript(&entry, &meta_state) else {
            self.report.entries_removed += 1;
            self.note(Finding::MissingTranscript {
                id,
                file: entry.file,
            });
            return Ok(None);
        };
        if found != entry.file {
            self.note(Finding::TranscriptRelocated {
                id: id.clone(),
                from: entry.file.clone(),
                to: found.clone(),
            });
            entry.file = found;
        }

        if entry.file != canonical_file {
            entry.file = self.canonicalize(&id, &entry.file, &canonical_file);
        }
        entry.meta = self.layout.metadata_name(&id);
        if entry != before {
            self.report.entries_corrected += 1;
        }

        self.reconcile_metadata(&entry, meta_state);
        Ok(Some(entry))
    }

    fn read_meta_state(&self, id: &str) -> StorageResult<MetaState> {
        match self.store.try_read_meta(id) {
            Ok(Some(meta)) => Ok(MetaState::Present(meta)),
            Ok(None) => Ok(MetaState::Missing),
            Err(StorageError::Corrupt { reason, .. }) => Ok(MetaState::Unreadable(reason)),
            Err(err) => Err(err),
        }
    }

    /// Name of the transcript of `entry`: the recorded name, else the
    /// canonical one, else the name its metadata records.
    fn locate_transcript(&self, entry: &ConversationMeta, state: &MetaState) -> Option<String> {
        let mut candidates = vec![entry.file.clone(), self.layout.transcript_name(&entry.id)];
        if let MetaState::Present(meta) = state {
            candidates.push(meta.file.clone());
        }
        candidates.into_iter().find(|name| {
            validate_file_name(name).is_ok()
                && !self.layout.is_reserved(name)
                && self.layout.file(name).is_file()
        })
    }

    /// Move a transcript to its canonical name and return the name the
    /// entry should record.
    fn canonicalize(&mut self, id: &str, current: &str, canonical: &str) -> String {
        self.note(Finding::NonCanonicalName {
            id: id.to_string(),
            file: current.to_string(),
            canonical: canonical.to_string(),
        });

        let target = self.layout.file(canonical);
        if target.exists() {
            self.note(Finding::CanonicalAlreadyPresent {
                id: id.to_string(),
                stale: current.to_string(),
            });
            return canonical.to_string();
        }

        if self.safe_mode {
            self.report.files_renamed += 1;
            self.keep.insert(current.to_string());
            return canonical.to_string();
        }

        match fs::rename(self.layout.file(current), &target) {
            Ok(()) => {
                self.report.files_renamed += 1;
                info!(id, from = current, to = canonical, "Transcript renamed to canonical name");
                canonical.to_string()
            }
            Err(err) => {
                self.note(Finding::RenameFailed {
                    id: id.to_string(),
                    reason: err.to_string(),
                });
                current.to_string()
            }
        }
    }

    fn reconcile_metadata(&mut self, entry: &ConversationMeta, state: MetaState) {
        match state {
            MetaState::Present(mut meta) => {
                if meta.id == entry.id && meta.file == entry.file && meta.meta == entry.meta {
                    return;
                }
                meta.id.clone_from(&entry.id);
                meta.file.clone_from(&entry.file);
                meta.meta.clone_from(&entry.meta);
                self.report.meta_corrected += 1;
                self.note(Finding::MetadataCorrected {
                    id: entry.id.clone(),
                });
                self.write_meta(&meta);
            }
            MetaState::Missing => self.restore_metadata(entry),
            MetaState::Unreadable(reason) => {
                self.note(Finding::MetadataUnreadable {
                    file: entry.meta.clone(),
                    reason,
                });
                if self.store.policy() == CorruptionPolicy::Recover {
                    self.restore_metadata(entry);
                }
            }
        }
    }

    fn restore_metadata(&mut self, entry: &ConversationMeta) {
        self.report.meta_corrected += 1;
        self.note(Finding::MetadataRestored {
            id: entry.id.clone(),
        });
        self.write_meta(entry);
    }

    fn write_meta(&mut self, meta: &ConversationMeta) {
        if self.safe_mode {
            return;
        }
        if let Err(err) = self.store.write_meta(&meta.id, meta) {
            self.note(Finding::MetadataWriteFailed {
                id: meta.id.clone(),
                reason: err.to_string(),
            });
        }
    }

    fn sweep_orphans(&mut self, index: &IndexDocument) -> StorageResult<()> {
        let mut protected = std::mem::take(&mut self.keep);
        for entry in &index.items {
            protected.insert(entry.file.clone());
            protected.insert(entry.meta.clone());
            protected.insert(self.layout.transcript_name(&entry.id));
            protected.insert(self.layout.metadata_name(&entry.id));
        }

        for name in list_files(self.layout.root())? {
            if self.layout.is_reserved(&name) || protected.contains(&name) {
                continue;
            }
            self.note(Finding::Orphan { file: name.clone() });
            if self.safe_mode {
                self.report.orphans_swept += 1;
                continue;
            }
            match fs::remove_file(self.layout.file(&name)) {
                Ok(()) => self.report.orphans_swept += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => self.note(Finding::OrphanRemovalFailed {
                    file: name,
                    reason: err.to_string(),
                }),
            }
        }
        Ok(())
    }

    /// An entry needs a valid id and a recorded file; whether that file is
    /// usable is left to [`Self::locate_transcript`].
    fn is_usable(entry: &ConversationMeta) -> bool {
        validate_id(&entry.id).is_ok() && !entry.file.trim().is_empty()
    }

    fn note(&mut self, finding: Finding) {
        warn!(safe_mode = self.safe_mode, "{finding}");
        self.report.findings.push(finding);
    }
}

fn is_complete(meta: &ConversationMeta) -> bool {
    validate_id(&meta.id).is_ok() && !meta.file.trim().is_empty() && !meta.meta.trim().is_empty()
}

/// Names of the regular files directly inside `root`.
fn list_files(root: &Path) -> io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(raw) => debug!(name = ?raw, "Skipping non UTF-8 file name"),
        }
    }
    Ok(names)
}
