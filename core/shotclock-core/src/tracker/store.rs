//! Persistence and merge logic for the time ledger.
//!
//! The live file covers one ISO week. The first merge that lands in a new
//! week archives the old file into the backup directory, prepends an entry
//! to the backup index, truncates the agent log, and starts the week fresh.
//! Merges are idempotent: a session's total is an absolute value keyed by
//! its start time, so replaying a flush can never double-count.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::truncate_to_second;
use crate::entity::SessionEntity;
use crate::error::{Result, ShotclockError};
use crate::paths::DataPaths;
use crate::storage;
use crate::tracker::types::{date_format, SessionDuration, TrackerData};

/// One archived week in the backup index, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyBackup {
    pub week: String,
    pub year: String,
    pub path: String,
    pub week_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupIndex {
    #[serde(default)]
    pub backups: Vec<WeeklyBackup>,
}

/// Handle on the ledger files. Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct TrackerStore {
    paths: DataPaths,
}

impl TrackerStore {
    pub fn new(paths: &DataPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    pub fn load(&self) -> TrackerData {
        storage::load_or_default(&self.paths.tracker_file(), "tracker store")
    }

    pub fn load_backup_index(&self) -> BackupIndex {
        storage::load_or_default(&self.paths.backup_index_file(), "backup index")
    }

    /// Merges one session reading into the ledger.
    ///
    /// `total_secs` is the session's cumulative attributed time, not an
    /// increment: merging 100 after 60 leaves 100, and replaying the same
    /// merge is a no-op. The containing project session's total is
    /// recomputed from its sessions on every merge.
    pub fn merge_session(
        &self,
        entity: &SessionEntity,
        total_secs: u64,
        start_time: NaiveTime,
        now: DateTime<Local>,
    ) -> Result<()> {
        let mut data = self.rollover_if_needed(self.load(), now)?;
        refresh_metadata(&mut data, now);

        let session = data
            .day_mut(now.date_naive())
            .project_mut(&entity.project)
            .session_mut(&entity.asset_name, &entity.department);
        let asset = session.asset_session_mut(truncate_to_second(start_time));
        asset.last_action_time = truncate_to_second(now.time());
        asset.total_time = SessionDuration::from_secs(total_secs);
        session.recompute_total();

        storage::save_atomic(&self.paths.tracker_file(), &data, "tracker store")
    }

    /// Archives and resets the ledger when `now` falls in a different ISO
    /// week than the one the ledger was written in.
    fn rollover_if_needed(&self, data: TrackerData, now: DateTime<Local>) -> Result<TrackerData> {
        let current_week = now.iso_week().week().to_string();
        if data.week.is_empty() || data.week == current_week {
            return Ok(data);
        }
        info!(
            from_week = %data.week,
            to_week = %current_week,
            "Week changed, archiving ledger"
        );
        self.archive_week(&data)?;
        Ok(TrackerData::default())
    }

    /// Writes the outgoing week into the backup directory, prepends it to
    /// the backup index, and truncates the agent log alongside a copy.
    fn archive_week(&self, data: &TrackerData) -> Result<()> {
        let archived_tracker = self.paths.archived_tracker_file(&data.week, &data.year);
        storage::save_atomic(&archived_tracker, data, "ledger archive")?;

        let log_file = self.paths.log_file();
        if log_file.exists() {
            let archived_log = self.paths.archived_log_file(&data.week, &data.year);
            fs_err::copy(&log_file, &archived_log).map_err(|source| ShotclockError::Io {
                context: format!("archiving log to {}", archived_log.display()),
                source,
            })?;
            fs_err::write(&log_file, "").map_err(|source| ShotclockError::Io {
                context: "truncating archived log".to_string(),
                source,
            })?;
        }

        let mut index = self.load_backup_index();
        index.backups.insert(
            0,
            WeeklyBackup {
                week: data.week.clone(),
                year: data.year.clone(),
                path: archived_tracker.display().to_string(),
                week_description: data.week_description.clone(),
            },
        );
        storage::save_atomic(&self.paths.backup_index_file(), &index, "backup index")
    }
}

fn refresh_metadata(data: &mut TrackerData, now: DateTime<Local>) {
    let iso = now.iso_week();
    data.user_id = current_user();
    data.year = iso.year().to_string();
    data.week = iso.week().to_string();
    data.week_description = week_description(now.date_naive());
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Monday-to-Friday range of `date`'s week in day-key format, e.g.
/// "02/03/26 - 06/03/26".
pub fn week_description(date: NaiveDate) -> String {
    let monday = date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()));
    let friday = monday + chrono::Duration::days(4);
    format!(
        "{} - {}",
        monday.format(date_format::FORMAT),
        friday.format(date_format::FORMAT)
    )
}
