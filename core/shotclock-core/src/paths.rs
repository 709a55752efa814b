//! Path management for shotclock data.
//!
//! All persisted state lives under one root directory (default
//! `~/.shotclock`). Centralizing the layout here keeps path decisions in one
//! place and lets tests inject a temp directory instead of touching the real
//! home.
//!
//! Layout:
//!
//! ```text
//! ~/.shotclock/
//!   hours.json          live tracker store
//!   backups.json        weekly backup index
//!   backup/             archived stores and logs, one pair per week
//!   tmp/processes.json  shared process registry
//!   tmp/last_active.json
//!   shotclock.log       agent log, archived and truncated on rollover
//!   config.toml
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Result, ShotclockError};

/// Central configuration for all shotclock storage paths.
///
/// Production code uses [`DataPaths::resolve`] which points to `~/.shotclock`.
/// Tests use [`DataPaths::with_root`] for isolation.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Resolves the default data root under the user's home directory.
    pub fn resolve() -> Result<Self> {
        let home = dirs::home_dir().ok_or(ShotclockError::HomeDirUnavailable)?;
        Ok(Self {
            root: home.join(".shotclock"),
        })
    }

    /// Creates a DataPaths with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to hours.json (live tracker store).
    pub fn tracker_file(&self) -> PathBuf {
        self.root.join("hours.json")
    }

    /// Path to backups.json (weekly backup index).
    pub fn backup_index_file(&self) -> PathBuf {
        self.root.join("backups.json")
    }

    /// Path to backup/ (weekly archives).
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join("backup")
    }

    /// Archive path for one week's tracker store.
    /// Example: `~/.shotclock/backup/34_2026_hours.json`
    pub fn archived_tracker_file(&self, week: &str, year: &str) -> PathBuf {
        self.backup_dir().join(format!("{week}_{year}_hours.json"))
    }

    /// Archive path for one week's agent log.
    pub fn archived_log_file(&self, week: &str, year: &str) -> PathBuf {
        self.backup_dir().join(format!("{week}_{year}_hours.log"))
    }

    /// Path to tmp/ (cross-monitor coordination files).
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Path to tmp/processes.json (shared process registry).
    pub fn registry_file(&self) -> PathBuf {
        self.tmp_dir().join("processes.json")
    }

    /// Path to tmp/last_active.json (shared last-active pointer).
    pub fn last_active_file(&self) -> PathBuf {
        self.tmp_dir().join("last_active.json")
    }

    /// Path to tmp/registry.lock, guarding registry mutations.
    pub fn registry_lock_file(&self) -> PathBuf {
        self.tmp_dir().join("registry.lock")
    }

    /// Path to shotclock.log.
    pub fn log_file(&self) -> PathBuf {
        self.root.join("shotclock.log")
    }

    /// Path to config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Ensures the root directory and standard subdirectories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.backup_dir(), self.tmp_dir()] {
            fs_err::create_dir_all(&dir).map_err(|source| ShotclockError::Io {
                context: format!("creating {}", dir.display()),
                source,
            })?;
        }
        Ok(())
    }
}
