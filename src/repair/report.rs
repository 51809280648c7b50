//! Outcome of one reconciliation pass.

use std::fmt;

use serde::Serialize;

/// One inconsistency seen during a pass.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// The index could not be parsed and was treated as absent.
    IndexUnreadable {
        /// Parser message.
        reason: String,
    },
    /// Index entry without a usable id or file name.
    InvalidEntry {
        /// Entry id, possibly empty.
        id: String,
        /// Entry file name, possibly empty.
        file: String,
    },
    /// Second index entry for an id already seen.
    DuplicateEntry {
        /// Conversation id.
        id: String,
    },
    /// No transcript exists for an index entry.
    MissingTranscript {
        /// Conversation id.
        id: String,
        /// File name the entry pointed at.
        file: String,
    },
    /// Transcript found under another name than the one the entry recorded.
    TranscriptRelocated {
        /// Conversation id.
        id: String,
        /// Recorded name.
        from: String,
        /// Name found on disk.
        to: String,
    },
    /// Transcript not stored under its canonical name.
    NonCanonicalName {
        /// Conversation id.
        id: String,
        /// Current name.
        file: String,
        /// Name derived from the id.
        canonical: String,
    },
    /// Canonical transcript already present next to a stale copy.
    CanonicalAlreadyPresent {
        /// Conversation id.
        id: String,
        /// Stale name, left to the orphan sweep.
        stale: String,
    },
    /// Renaming to the canonical name failed.
    RenameFailed {
        /// Conversation id.
        id: String,
        /// Error message.
        reason: String,
    },
    /// Metadata `file`/`meta` fields disagreed with the names in use.
    MetadataCorrected {
        /// Conversation id.
        id: String,
    },
    /// Metadata file missing or unreadable, rewritten from the index entry.
    MetadataRestored {
        /// Conversation id.
        id: String,
    },
    /// Metadata file could not be parsed.
    MetadataUnreadable {
        /// File name.
        file: String,
        /// Parser message.
        reason: String,
    },
    /// Metadata document lacks `id`, `file` or `meta`.
    MetadataIncomplete {
        /// File name.
        file: String,
    },
    /// Writing a metadata document failed.
    MetadataWriteFailed {
        /// Conversation id.
        id: String,
        /// Error message.
        reason: String,
    },
    /// Conversation present on disk but absent from the index.
    Adopted {
        /// Conversation id.
        id: String,
    },
    /// File referenced by no index entry.
    Orphan {
        /// File name.
        file: String,
    },
    /// Deleting an orphan failed.
    OrphanRemovalFailed {
        /// File name.
        file: String,
        /// Error message.
        reason: String,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexUnreadable { reason } => write!(f, "index unreadable: {reason}"),
            Self::InvalidEntry { id, file } => {
                write!(f, "invalid index entry (id `{id}`, file `{file}`)")
            }
            Self::DuplicateEntry { id } => write!(f, "duplicate index entry for {id}"),
            Self::MissingTranscript { id, file } => {
                write!(f, "transcript {file} of {id} is missing")
            }
            Self::TranscriptRelocated { id, from, to } => {
                write!(f, "transcript of {id} found as {to} instead of {from}")
            }
            Self::NonCanonicalName { id, file, canonical } => {
                write!(f, "transcript of {id} is {file}, expected {canonical}")
            }
            Self::CanonicalAlreadyPresent { id, stale } => {
                write!(f, "canonical transcript of {id} already exists, {stale} is stale")
            }
            Self::RenameFailed { id, reason } => write!(f, "rename of {id} failed: {reason}"),
            Self::MetadataCorrected { id } => write!(f, "metadata of {id} corrected"),
            Self::MetadataRestored { id } => write!(f, "metadata of {id} restored from index"),
            Self::MetadataUnreadable { file, reason } => write!(f, "{file} unreadable: {reason}"),
            Self::MetadataIncomplete { file } => write!(f, "{file} lacks id, file or meta"),
            Self::MetadataWriteFailed { id, reason } => {
                write!(f, "metadata write for {id} failed: {reason}")
            }
            Self::Adopted { id } => write!(f, "conversation {id} adopted into the index"),
            Self::Orphan { file } => write!(f, "orphan file {file}"),
            Self::OrphanRemovalFailed { file, reason } => {
                write!(f, "could not remove {file}: {reason}")
            }
        }
    }
}

/// Counts and findings of a pass.
///
/// In safe mode the counts describe what a normal pass would have done.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RepairReport {
    /// Report-only pass.
    pub safe_mode: bool,
    /// Index entries dropped.
    pub entries_removed: usize,
    /// Index entries whose fields changed.
    pub entries_corrected: usize,
    /// Conversations added back to the index.
    pub entries_adopted: usize,
    /// Metadata documents corrected or restored.
    pub meta_corrected: usize,
    /// Transcripts renamed to their canonical name.
    pub files_renamed: usize,
    /// Orphan files deleted.
    pub orphans_swept: usize,
    /// Index rebuilt from metadata files.
    pub index_rebuilt: bool,
    /// Index document written by this pass.
    pub index_written: bool,
    /// Individual findings, in discovery order.
    pub findings: Vec<Finding>,
}

impl RepairReport {
    /// Empty report.
    #[must_use]
    pub fn new(safe_mode: bool) -> Self {
        Self {
            safe_mode,
            ..Self::default()
        }
    }

    /// Whether the pass found nothing to do.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
            && !self.index_rebuilt
            && self.entries_removed == 0
            && self.entries_corrected == 0
            && self.entries_adopted == 0
            && self.meta_corrected == 0
            && self.files_renamed == 0
            && self.orphans_swept == 0
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.safe_mode { "safe" } else { "normal" };
        write!(
            f,
            "repair ({mode}): {} entries removed, {} metadata corrected, {} files renamed, {} orphans swept",
            self.entries_removed, self.meta_corrected, self.files_renamed, self.orphans_swept
        )?;
        if self.entries_adopted > 0 {
            write!(f, ", {} adopted", self.entries_adopted)?;
        }
        if self.index_rebuilt {
            write!(f, ", index rebuilt")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        let mut report = RepairReport::new(true);
        assert!(report.is_clean());
        assert_eq!(
            report.to_string(),
            "repair (safe): 0 entries removed, 0 metadata corrected, 0 files renamed, 0 orphans swept"
        );

        report.orphans_swept = 2;
        report.index_rebuilt = true;
        report.findings.push(Finding::Orphan {
            file: "stray.txt".to_string(),
        });
        assert!(!report.is_clean());
        assert!(report.to_string().ends_with("2 orphans swept, index rebuilt"));
        assert_eq!(report.findings[0].to_string(), "orphan file stray.txt");
    }
}
