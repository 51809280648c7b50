//! Process bootstrap for the `chatvault-repair` binary.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::repair::report::RepairReport;
use crate::storage::config::StorageConfig;
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::repository::ConversationRepository;

/// Command-line usage of the repair binary.
pub const USAGE: &str = "usage: chatvault-repair [--safe] [--dir PATH]";

/// Options of one repair run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RepairOptions {
    /// Report only, never mutate.
    pub safe_mode: bool,
    /// Storage directory overriding the configured one.
    pub dir: Option<PathBuf>,
}

impl RepairOptions {
    /// Parse `--safe`, `--dir PATH` and `--dir=PATH`.
    ///
    /// # Errors
    /// Returns an error for unknown arguments or a `--dir` without a value.
    pub fn from_args<I>(args: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--safe" => options.safe_mode = true,
                "--dir" => {
                    let dir = args.next().ok_or_else(|| {
                        StorageError::InvalidConfig("--dir expects a path".to_string())
                    })?;
                    options.dir = Some(PathBuf::from(dir));
                }
                other => {
                    if let Some(dir) = other.strip_prefix("--dir=") {
                        options.dir = Some(PathBuf::from(dir));
                    } else {
                        return Err(StorageError::InvalidConfig(format!(
                            "unknown argument `{other}`"
                        )));
                    }
                }
            }
        }
        Ok(options)
    }
}

/// Install the global `fmt` subscriber, filtered by `RUST_LOG` with `info`
/// enabled. Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
    if installed.is_err() {
        debug!("Tracing subscriber already installed");
    }
}

/// Run one reconciliation pass with the environment configuration.
///
/// `CHATVAULT_REPAIR_SAFE` also selects safe mode.
///
/// # Errors
/// Returns an error if the configuration is invalid or the pass fails.
pub fn run_repair(options: &RepairOptions) -> StorageResult<RepairReport> {
    let mut config = StorageConfig::from_env()?;
    if let Some(dir) = &options.dir {
        config.root_dir.clone_from(dir);
    }
    let safe_mode = options.safe_mode || config.repair_safe_mode;

    info!(
        "Starting chatvault repair v{} on {} (safe mode: {safe_mode})",
        env!("CARGO_PKG_VERSION"),
        config.root_dir.display()
    );
    ConversationRepository::open(&config)?
        .reconciler()
        .run(safe_mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(
            RepairOptions::from_args(args(&[])).unwrap(),
            RepairOptions::default()
        );

        let options = RepairOptions::from_args(args(&["--safe", "--dir", "/tmp/chats"])).unwrap();
        assert!(options.safe_mode);
        assert_eq!(options.dir, Some(PathBuf::from("/tmp/chats")));

        let options = RepairOptions::from_args(args(&["--dir=store"])).unwrap();
        assert_eq!(options.dir, Some(PathBuf::from("store")));
        assert!(!options.safe_mode);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(RepairOptions::from_args(args(&["--dir"])).is_err());
        assert!(RepairOptions::from_args(args(&["--fast"])).is_err());
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
