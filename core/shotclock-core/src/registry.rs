//! Shared process registry: which pids are tracked, by whom, with how much
//! accumulated time.
//!
//! Several monitor processes write here concurrently, so every mutation is a
//! read-merge-write under an advisory file lock and only ever touches the
//! caller's own entries. Ownership recorded in the file wins over a caller's
//! in-memory view; the one exception is [`ProcessRegistry::register`], which
//! is the explicit re-homing path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ShotclockError};
use crate::paths::DataPaths;
use crate::storage;

/// Lifecycle of a tracked process between flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Held the foreground since the last flush.
    Active,
    /// Alive but out of focus since the last flush.
    Inactive,
    /// Underlying OS process is gone; leaves the registry after a final flush.
    Stale,
}

impl ProcessStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Stale => "stale",
        }
    }
}

/// One monitored editing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProcess {
    /// Content file the session has open.
    pub path: String,
    pub executable: String,
    /// Attributed seconds so far. Absolute, not a delta; flushes write it
    /// into the ledger as-is.
    pub seconds: u64,
    pub status: ProcessStatus,
    /// Seconds spent Inactive since the last Active flush.
    #[serde(default)]
    pub idle_secs: u64,
    /// Session start. Also the session key in the time ledger.
    pub first_seen: NaiveTime,
    /// Id of the monitor that owns this entry.
    pub owner: String,
}

/// pid → tracked process, as persisted in `tmp/processes.json`.
pub type ProcessMap = BTreeMap<u32, TrackedProcess>;

/// Shared last-active pointer, persisted in `tmp/last_active.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastActive {
    pub pid: u32,
    #[serde(flatten)]
    pub record: TrackedProcess,
}

/// Handle on the registry files. Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    registry_file: PathBuf,
    last_active_file: PathBuf,
    lock_file: PathBuf,
}

impl ProcessRegistry {
    pub fn new(paths: &DataPaths) -> Self {
        Self {
            registry_file: paths.registry_file(),
            last_active_file: paths.last_active_file(),
            lock_file: paths.registry_lock_file(),
        }
    }

    /// Every registry entry, regardless of owner.
    pub fn read_all(&self) -> ProcessMap {
        storage::load_or_default(&self.registry_file, "process registry")
    }

    /// Entries owned by `owner`.
    pub fn read_by_owner(&self, owner: &str) -> ProcessMap {
        self.read_all()
            .into_iter()
            .filter(|(_, record)| record.owner == owner)
            .collect()
    }

    /// Replaces the caller's ownership slice with `entries`.
    ///
    /// Entries owned by other monitors pass through untouched. A pid in
    /// `entries` that the file meanwhile attributes to a different owner is
    /// skipped; the caller discovers the loss by filtering the returned
    /// merged map by its own id. Caller-owned pids absent from `entries` are
    /// dropped, which is how finished processes leave the registry.
    pub fn upsert(&self, entries: &ProcessMap, owner: &str) -> Result<ProcessMap> {
        let _guard = MutationGuard::acquire(&self.lock_file)?;
        let current = self.read_all();
        let mut merged: ProcessMap = current
            .iter()
            .filter(|(_, record)| record.owner != owner)
            .map(|(pid, record)| (*pid, record.clone()))
            .collect();
        for (pid, record) in entries {
            match merged.get(pid) {
                Some(holder) if holder.owner != owner => {
                    debug!(
                        pid = *pid,
                        caller = owner,
                        holder = %holder.owner,
                        "Pid re-homed by another monitor, keeping file entry"
                    );
                }
                _ => {
                    merged.insert(*pid, record.clone());
                }
            }
        }
        storage::save_atomic(&self.registry_file, &merged, "process registry")?;
        Ok(merged)
    }

    /// Claims `pid` for `record.owner`, re-homing it if another monitor held
    /// it. Callers flush the previous owner's accumulated time first so the
    /// reset to a fresh record loses nothing.
    pub fn register(&self, pid: u32, record: TrackedProcess) -> Result<()> {
        let _guard = MutationGuard::acquire(&self.lock_file)?;
        let mut current = self.read_all();
        if let Some(previous) = current.get(&pid) {
            if previous.owner != record.owner {
                debug!(
                    pid,
                    previous_owner = %previous.owner,
                    new_owner = %record.owner,
                    "Re-homing registry entry"
                );
            }
        }
        current.insert(pid, record);
        storage::save_atomic(&self.registry_file, &current, "process registry")
    }

    /// Removes the named pids, skipping any not owned by `owner`.
    pub fn remove(&self, pids: &[u32], owner: &str) -> Result<()> {
        let _guard = MutationGuard::acquire(&self.lock_file)?;
        let mut current = self.read_all();
        let mut changed = false;
        for pid in pids {
            if current.get(pid).is_some_and(|record| record.owner == owner) {
                current.remove(pid);
                changed = true;
            }
        }
        if changed {
            storage::save_atomic(&self.registry_file, &current, "process registry")?;
        }
        Ok(())
    }

    /// Last-active pointer, only when its recorded owner is `owner`.
    /// A pointer owned by someone else reads as absent.
    pub fn get_last_active(&self, owner: &str) -> Option<LastActive> {
        let pointer: Option<LastActive> =
            storage::load_or_default(&self.last_active_file, "last-active pointer");
        pointer.filter(|last| last.record.owner == owner)
    }

    /// Publishes the shared last-active pointer. Only the monitor the
    /// registry currently records as the pid's owner may publish; stale
    /// callers are ignored with a warning.
    pub fn set_last_active(&self, pid: u32, record: &TrackedProcess) -> Result<()> {
        let _guard = MutationGuard::acquire(&self.lock_file)?;
        let current = self.read_all();
        match current.get(&pid) {
            Some(holder) if holder.owner == record.owner => {
                let pointer = Some(LastActive {
                    pid,
                    record: record.clone(),
                });
                storage::save_atomic(&self.last_active_file, &pointer, "last-active pointer")
            }
            Some(holder) => {
                warn!(
                    pid,
                    caller = %record.owner,
                    holder = %holder.owner,
                    "Refusing last-active update from non-owner"
                );
                Ok(())
            }
            None => {
                warn!(
                    pid,
                    caller = %record.owner,
                    "Refusing last-active update for unregistered pid"
                );
                Ok(())
            }
        }
    }
}

/// Advisory exclusive lock held across one read-merge-write. Released on
/// drop. Readers never take it; writes are atomic renames so a torn read
/// cannot happen.
struct MutationGuard {
    #[allow(dead_code)]
    file: std::fs::File,
}

impl MutationGuard {
    #[cfg(unix)]
    fn acquire(lock_file: &Path) -> Result<Self> {
        use std::os::unix::io::AsRawFd;

        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_file)
            .map_err(|source| ShotclockError::Io {
                context: format!("opening lock file {}", lock_file.display()),
                source,
            })?;
        // SAFETY: flock on a file descriptor this guard owns.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc != 0 {
            return Err(ShotclockError::Io {
                context: format!("locking {}", lock_file.display()),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(Self { file })
    }

    #[cfg(not(unix))]
    fn acquire(lock_file: &Path) -> Result<Self> {
        // Without flock the atomic-rename writes still leave files
        // consistent; concurrent mutations just race on the merge.
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_file)
            .map_err(|source| ShotclockError::Io {
                context: format!("opening lock file {}", lock_file.display()),
                source,
            })?;
        Ok(Self { file })
    }
}

#[cfg(unix)]
impl Drop for MutationGuard {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        // SAFETY: releasing a lock this guard holds.
        #[allow(unsafe_code)]
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(temp: &TempDir) -> ProcessRegistry {
        let paths = DataPaths::with_root(temp.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        ProcessRegistry::new(&paths)
    }

    fn tracked(owner: &str, seconds: u64) -> TrackedProcess {
        TrackedProcess {
            path: "/projects/wizard/dragon/animation/dragon_v001.ma".to_string(),
            executable: "maya".to_string(),
            seconds,
            status: ProcessStatus::Active,
            idle_secs: 0,
            first_seen: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            owner: owner.to_string(),
        }
    }

    #[test]
    fn test_register_then_read_all_round_trips() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);

        registry.register(100, tracked("m1", 30)).unwrap();

        let all = registry.read_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[&100].seconds, 30);
        assert_eq!(all[&100].owner, "m1");
    }

    #[test]
    fn test_read_by_owner_filters_other_monitors() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        registry.register(100, tracked("m1", 10)).unwrap();
        registry.register(200, tracked("m2", 20)).unwrap();

        let mine = registry.read_by_owner("m1");
        assert_eq!(mine.len(), 1);
        assert!(mine.contains_key(&100));
    }

    #[test]
    fn test_upsert_preserves_entries_of_other_owners() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        registry.register(200, tracked("m2", 99)).unwrap();

        let mut mine = ProcessMap::new();
        mine.insert(100, tracked("m1", 5));
        registry.upsert(&mine, "m1").unwrap();

        let all = registry.read_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&200].seconds, 99);
        assert_eq!(all[&200].owner, "m2");
    }

    #[test]
    fn test_upsert_drops_own_entries_missing_from_new_set() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        registry.register(100, tracked("m1", 5)).unwrap();
        registry.register(101, tracked("m1", 6)).unwrap();

        let mut mine = ProcessMap::new();
        mine.insert(101, tracked("m1", 7));
        registry.upsert(&mine, "m1").unwrap();

        let all = registry.read_all();
        assert!(!all.contains_key(&100));
        assert_eq!(all[&101].seconds, 7);
    }

    #[test]
    fn test_upsert_does_not_resurrect_re_homed_pid() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        registry.register(100, tracked("m1", 50)).unwrap();
        // Another monitor claims the pid.
        registry.register(100, tracked("m2", 0)).unwrap();

        let mut stale_view = ProcessMap::new();
        stale_view.insert(100, tracked("m1", 80));
        let merged = registry.upsert(&stale_view, "m1").unwrap();

        assert_eq!(merged[&100].owner, "m2");
        assert_eq!(registry.read_all()[&100].owner, "m2");
        assert!(merged.values().all(|record| record.owner != "m1"));
    }

    #[test]
    fn test_remove_skips_pids_owned_by_others() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        registry.register(100, tracked("m1", 1)).unwrap();
        registry.register(200, tracked("m2", 2)).unwrap();

        registry.remove(&[100, 200], "m1").unwrap();

        let all = registry.read_all();
        assert!(!all.contains_key(&100));
        assert!(all.contains_key(&200));
    }

    #[test]
    fn test_last_active_round_trips_for_owner() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        let record = tracked("m1", 12);
        registry.register(100, record.clone()).unwrap();

        registry.set_last_active(100, &record).unwrap();

        let last = registry.get_last_active("m1").unwrap();
        assert_eq!(last.pid, 100);
        assert_eq!(last.record.seconds, 12);
    }

    #[test]
    fn test_get_last_active_hides_pointer_from_other_owners() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        let record = tracked("m1", 12);
        registry.register(100, record.clone()).unwrap();
        registry.set_last_active(100, &record).unwrap();

        assert!(registry.get_last_active("m2").is_none());
    }

    #[test]
    fn test_set_last_active_refused_after_re_home() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        let old = tracked("m1", 40);
        registry.register(100, old.clone()).unwrap();
        let new = tracked("m2", 0);
        registry.register(100, new.clone()).unwrap();
        registry.set_last_active(100, &new).unwrap();

        // m1's stale publish is a no-op.
        registry.set_last_active(100, &old).unwrap();

        let last = registry.get_last_active("m2").unwrap();
        assert_eq!(last.record.owner, "m2");
        assert!(registry.get_last_active("m1").is_none());
    }

    #[test]
    fn test_corrupt_registry_file_reads_as_empty() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        std::fs::write(temp.path().join("tmp/processes.json"), "{oops").unwrap();

        assert!(registry.read_all().is_empty());
    }

    #[test]
    fn test_registry_survives_missing_last_active_file() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        assert!(registry.get_last_active("m1").is_none());
    }
}
