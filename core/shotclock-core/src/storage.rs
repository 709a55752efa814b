//! Defensive JSON persistence shared by the registry and the tracker store.
//!
//! Reads never fail: a missing, empty, or corrupt file yields the type's
//! default value so callers proceed as if starting fresh. Writes go through
//! a temp file in the target's parent directory and are persisted with a
//! rename, so a crash mid-write never leaves a truncated store behind.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Result, ShotclockError};

/// Loads a JSON document, substituting `T::default()` on any failure.
///
/// `what` names the store in log lines (e.g. "process registry").
pub fn load_or_default<T>(path: &Path, what: &str) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return T::default();
    }

    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(error = %err, what, "Failed to read store, starting empty");
            return T::default();
        }
    };

    if content.trim().is_empty() {
        return T::default();
    }

    match serde_json::from_str::<T>(&content) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, what, path = %path.display(), "Failed to parse store, starting empty");
            T::default()
        }
    }
}

/// Serializes `value` and atomically replaces the file at `path`.
pub fn save_atomic<T>(path: &Path, value: &T, what: &str) -> Result<()>
where
    T: Serialize,
{
    let content = serde_json::to_string_pretty(value).map_err(|source| ShotclockError::Json {
        context: format!("serializing {what}"),
        source,
    })?;

    let parent_dir = path.parent().ok_or_else(|| ShotclockError::Io {
        context: format!("{what} path has no parent directory"),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, path.display().to_string()),
    })?;

    let mut temp_file = NamedTempFile::new_in(parent_dir).map_err(|source| ShotclockError::Io {
        context: format!("creating temp file for {what}"),
        source,
    })?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|source| ShotclockError::Io {
            context: format!("writing temp file for {what}"),
            source,
        })?;
    temp_file.flush().map_err(|source| ShotclockError::Io {
        context: format!("flushing temp file for {what}"),
        source,
    })?;
    temp_file.persist(path).map_err(|err| ShotclockError::Io {
        context: format!("persisting {what} to {}", path.display()),
        source: err.error,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_load_nonexistent_file_returns_default() {
        let temp = tempdir().unwrap();
        let loaded: BTreeMap<u32, String> =
            load_or_default(&temp.path().join("missing.json"), "test store");
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_load_empty_file_returns_default() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("empty.json");
        fs_err::write(&file, "").unwrap();

        let loaded: BTreeMap<u32, String> = load_or_default(&file, "test store");
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_load_corrupt_json_returns_default() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("corrupt.json");
        fs_err::write(&file, "{invalid json}").unwrap();

        let loaded: BTreeMap<u32, String> = load_or_default(&file, "test store");
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("store.json");

        let mut value = BTreeMap::new();
        value.insert(100u32, "maya".to_string());
        save_atomic(&file, &value, "test store").unwrap();

        let loaded: BTreeMap<u32, String> = load_or_default(&file, "test store");
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_save_overwrites_previous_content() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("store.json");

        let mut first = BTreeMap::new();
        first.insert(1u32, "a".to_string());
        save_atomic(&file, &first, "test store").unwrap();

        let mut second = BTreeMap::new();
        second.insert(2u32, "b".to_string());
        save_atomic(&file, &second, "test store").unwrap();

        let loaded: BTreeMap<u32, String> = load_or_default(&file, "test store");
        assert_eq!(loaded, second);
    }
}
