//! Configuration for the conversation store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::errors::{StorageError, StorageResult};

/// Environment variable overriding the storage directory.
pub const DIR_ENV: &str = "CHATVAULT_DIR";
/// Environment variable enabling report-only repair on open.
pub const REPAIR_SAFE_ENV: &str = "CHATVAULT_REPAIR_SAFE";
/// Environment variable toggling the repair pass on open.
pub const REPAIR_ON_OPEN_ENV: &str = "CHATVAULT_REPAIR_ON_OPEN";
/// Environment variable selecting the corruption policy (`recover` or `fail`).
pub const ON_CORRUPTION_ENV: &str = "CHATVAULT_ON_CORRUPTION";

/// What to do when a metadata, index or registry document fails to parse.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Log the failure and treat the document as absent.
    #[default]
    Recover,
    /// Surface the failure to the caller as [`StorageError::Corrupt`].
    Fail,
}

impl CorruptionPolicy {
    /// Parse a policy name (`recover` or `fail`, case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "recover" => Some(Self::Recover),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// Storage settings for conversation files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding transcripts, metadata, the index and the registry.
    pub root_dir: PathBuf,
    /// File name of the index document.
    pub index_filename: String,
    /// File name of the reference-document registry.
    pub registry_filename: String,
    /// Prefix of every conversation file name.
    pub file_prefix: String,
    /// Transcript extension, dot included.
    pub transcript_ext: String,
    /// Metadata extension, dot included.
    pub metadata_ext: String,
    /// Corruption handling for JSON documents.
    pub on_corruption: CorruptionPolicy,
    /// Run a reconciliation pass when the manager is opened.
    pub repair_on_open: bool,
    /// Run the open-time pass in report-only mode.
    pub repair_safe_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("conversations").join("sav_conversations"),
            index_filename: "index.json".to_string(),
            registry_filename: "attached_docs.json".to_string(),
            file_prefix: "conversation".to_string(),
            transcript_ext: ".txt".to_string(),
            metadata_ext: ".json".to_string(),
            on_corruption: CorruptionPolicy::Recover,
            repair_on_open: true,
            repair_safe_mode: false,
        }
    }
}

impl StorageConfig {
    /// Default configuration rooted at `root_dir`.
    #[must_use]
    pub fn in_dir(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Default configuration with overrides read from the process environment.
    ///
    /// # Errors
    /// Returns an error if an override holds an unusable value.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Default configuration with overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns an error if an override holds an unusable value.
    pub fn from_env_with<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(DIR_ENV).filter(|d| !d.trim().is_empty()) {
            config.root_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(REPAIR_SAFE_ENV) {
            config.repair_safe_mode = parse_flag(REPAIR_SAFE_ENV, &value)?;
        }
        if let Some(value) = lookup(REPAIR_ON_OPEN_ENV) {
            config.repair_on_open = parse_flag(REPAIR_ON_OPEN_ENV, &value)?;
        }
        if let Some(value) = lookup(ON_CORRUPTION_ENV) {
            config.on_corruption = CorruptionPolicy::parse(&value).ok_or_else(|| {
                StorageError::InvalidConfig(format!(
                    "{ON_CORRUPTION_ENV} must be `recover` or `fail`, got `{value}`"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> StorageResult<()> {
        if self.file_prefix.trim().is_empty() {
            return Err(StorageError::InvalidConfig(
                "file_prefix must not be empty".to_string(),
            ));
        }
        if has_separator(&self.file_prefix) {
            return Err(StorageError::InvalidConfig(
                "file_prefix must not contain path separators".to_string(),
            ));
        }

        for (name, ext) in [
            ("transcript_ext", &self.transcript_ext),
            ("metadata_ext", &self.metadata_ext),
        ] {
            if !ext.starts_with('.') || ext.len() < 2 || has_separator(ext) {
                return Err(StorageError::InvalidConfig(format!(
                    "{name} must look like `.ext`, got `{ext}`"
                )));
            }
        }

        if self.transcript_ext.eq_ignore_ascii_case(&self.metadata_ext) {
            return Err(StorageError::InvalidConfig(
                "transcript_ext and metadata_ext must differ".to_string(),
            ));
        }

        for (name, file) in [
            ("index_filename", &self.index_filename),
            ("registry_filename", &self.registry_filename),
        ] {
            if file.trim().is_empty() || has_separator(file) {
                return Err(StorageError::InvalidConfig(format!(
                    "{name} must be a plain file name, got `{file}`"
                )));
            }
        }

        if self
            .index_filename
            .eq_ignore_ascii_case(&self.registry_filename)
        {
            return Err(StorageError::InvalidConfig(
                "index_filename and registry_filename must differ".to_string(),
            ));
        }

        Ok(())
    }
}

fn has_separator(value: &str) -> bool {
    value.contains('/') || value.contains('\\') || value.contains("..")
}

fn parse_flag(key: &str, value: &str) -> StorageResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(StorageError::InvalidConfig(format!(
            "{key} must be a boolean flag, got `{other}`"
        ))),
    }
}
