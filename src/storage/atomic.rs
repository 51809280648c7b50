//! Atomic file replacement.
//!
//! Every transcript, metadata, index and registry write goes through
//! [`atomic_write_text`]: content lands in a temporary file created in the
//! destination's own directory, is synced, then renamed over the target.
//! Readers observe either the previous file or the new one, never a prefix.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

/// Prefix of in-flight temporary files.
pub const TEMP_PREFIX: &str = ".tmp_";

/// Atomically replace `path` with `content`.
///
/// The temporary file is removed when any step fails, and the destination
/// is left untouched.
///
/// # Errors
/// Returns an error if the temporary file cannot be created, written,
/// synced, or renamed over the destination.
pub fn atomic_write_text(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    // On failure the returned handle still owns the temp file and deletes it on drop.
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Read a whole UTF-8 file.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid UTF-8.
pub fn read_text(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leftover_temps(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .count()
    }

    #[test]
    fn test_atomic_write_basic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conversation_a.txt");

        atomic_write_text(&path, "hello world").unwrap();

        assert_eq!(read_text(&path).unwrap(), "hello world");
        assert_eq!(leftover_temps(temp_dir.path()), 0);
    }

    #[test]
    fn test_atomic_write_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");

        atomic_write_text(&path, "original").unwrap();
        atomic_write_text(&path, "updated").unwrap();

        assert_eq!(read_text(&path).unwrap(), "updated");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("meta.json");

        atomic_write_text(&path, "{}").unwrap();

        assert_eq!(read_text(&path).unwrap(), "{}");
    }

    #[test]
    fn test_failed_replace_leaves_destination_and_no_temp() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep.txt"), "keep").unwrap();

        let result = atomic_write_text(&target, "content");

        assert!(result.is_err());
        assert!(target.is_dir());
        assert_eq!(read_text(&target.join("keep.txt")).unwrap(), "keep");
        assert_eq!(leftover_temps(temp_dir.path()), 0);
    }

    #[test]
    fn test_empty_content_creates_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.txt");

        atomic_write_text(&path, "").unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }
}
