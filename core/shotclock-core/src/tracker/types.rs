//! Ledger data model.
//!
//! The persisted shape is Day → Project → ProjectSession → AssetSession.
//! Collections are ordered vectors rather than maps: insertion order mirrors
//! the order work happened, which is the order reports want it in. Lookups
//! go through the `*_mut` find-or-create accessors.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ShotclockError;

/// Wall-clock total rendered as `H:MM:SS` with unpadded hours, e.g.
/// "0:01:40" or "11:05:09". This is the on-disk and report format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionDuration(u64);

impl SessionDuration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;
        write!(f, "{hours}:{minutes:02}:{seconds:02}")
    }
}

impl From<SessionDuration> for String {
    fn from(duration: SessionDuration) -> Self {
        duration.to_string()
    }
}

impl FromStr for SessionDuration {
    type Err = ShotclockError;

    /// Accepts `H:MM:SS` with or without hour padding.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || ShotclockError::DurationMalformed(raw.to_string());
        let mut parts = raw.split(':');
        let hours: u64 = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(malformed)?;
        let minutes: u64 = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(malformed)?;
        let seconds: u64 = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
            return Err(malformed());
        }
        Ok(Self(hours * 3600 + minutes * 60 + seconds))
    }
}

impl TryFrom<String> for SessionDuration {
    type Error = ShotclockError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

/// Day keys and week descriptions use two-digit day/month/year.
pub mod date_format {
    use chrono::NaiveDate;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%d/%m/%y";

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// One continuous stint in an asset, keyed by its start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSession {
    pub start_time: NaiveTime,
    pub last_action_time: NaiveTime,
    pub total_time: SessionDuration,
}

/// All work on one asset/department pair within a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSession {
    pub asset_name: String,
    pub department: String,
    pub asset_sessions: Vec<AssetSession>,
    /// Always the sum of `asset_sessions`; recomputed, never incremented.
    pub total_time: SessionDuration,
}

impl ProjectSession {
    pub fn new(asset_name: &str, department: &str) -> Self {
        Self {
            asset_name: asset_name.to_string(),
            department: department.to_string(),
            asset_sessions: Vec::new(),
            total_time: SessionDuration::default(),
        }
    }

    /// Session keyed by `start_time`, created empty on first sight. The same
    /// start time always resolves to the same session, which is what makes
    /// repeated flushes idempotent.
    pub fn asset_session_mut(&mut self, start_time: NaiveTime) -> &mut AssetSession {
        let idx = match self
            .asset_sessions
            .iter()
            .position(|session| session.start_time == start_time)
        {
            Some(idx) => idx,
            None => {
                self.asset_sessions.push(AssetSession {
                    start_time,
                    last_action_time: start_time,
                    total_time: SessionDuration::default(),
                });
                self.asset_sessions.len() - 1
            }
        };
        &mut self.asset_sessions[idx]
    }

    pub fn recompute_total(&mut self) {
        let total = self
            .asset_sessions
            .iter()
            .map(|session| session.total_time.as_secs())
            .sum();
        self.total_time = SessionDuration::from_secs(total);
    }
}

/// One project's sessions within a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_name: String,
    pub project_sessions: Vec<ProjectSession>,
}

impl Project {
    pub fn new(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            project_sessions: Vec::new(),
        }
    }

    pub fn session_mut(&mut self, asset_name: &str, department: &str) -> &mut ProjectSession {
        let idx = match self
            .project_sessions
            .iter()
            .position(|session| session.asset_name == asset_name && session.department == department)
        {
            Some(idx) => idx,
            None => {
                self.project_sessions.push(ProjectSession::new(asset_name, department));
                self.project_sessions.len() - 1
            }
        };
        &mut self.project_sessions[idx]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    #[serde(with = "date_format")]
    pub date: NaiveDate,
    pub projects: Vec<Project>,
}

impl Day {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            projects: Vec::new(),
        }
    }

    pub fn project_mut(&mut self, project_name: &str) -> &mut Project {
        let idx = match self
            .projects
            .iter()
            .position(|project| project.project_name == project_name)
        {
            Some(idx) => idx,
            None => {
                self.projects.push(Project::new(project_name));
                self.projects.len() - 1
            }
        };
        &mut self.projects[idx]
    }
}

/// Root of the live ledger file, scoped to one ISO week.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerData {
    #[serde(default)]
    pub days: Vec<Day>,
    #[serde(default)]
    pub user_id: String,
    /// ISO week-year, e.g. "2026".
    #[serde(default)]
    pub year: String,
    /// ISO week number, e.g. "11".
    #[serde(default)]
    pub week: String,
    /// Monday-to-Friday range in day-key format.
    #[serde(default)]
    pub week_description: String,
}

impl TrackerData {
    pub fn day_mut(&mut self, date: NaiveDate) -> &mut Day {
        let idx = match self.days.iter().position(|day| day.date == date) {
            Some(idx) => idx,
            None => {
                self.days.push(Day::new(date));
                self.days.len() - 1
            }
        };
        &mut self.days[idx]
    }

    pub fn day(&self, date: NaiveDate) -> Option<&Day> {
        self.days.iter().find(|day| day.date == date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_renders_with_unpadded_hours() {
        assert_eq!(SessionDuration::from_secs(100).to_string(), "0:01:40");
        assert_eq!(SessionDuration::from_secs(0).to_string(), "0:00:00");
        assert_eq!(SessionDuration::from_secs(39_909).to_string(), "11:05:09");
        assert_eq!(SessionDuration::from_secs(360_000).to_string(), "100:00:00");
    }

    #[test]
    fn duration_parses_padded_and_unpadded() {
        assert_eq!(
            "0:01:40".parse::<SessionDuration>().unwrap(),
            SessionDuration::from_secs(100)
        );
        assert_eq!(
            "00:01:40".parse::<SessionDuration>().unwrap(),
            SessionDuration::from_secs(100)
        );
        assert_eq!(
            "27:00:05".parse::<SessionDuration>().unwrap(),
            SessionDuration::from_secs(27 * 3600 + 5)
        );
    }

    #[test]
    fn duration_rejects_garbage() {
        for raw in ["", "1:2", "1:60:00", "1:00:61", "1:00:00:00", "x:00:00"] {
            assert!(raw.parse::<SessionDuration>().is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn duration_serde_round_trips_as_string() {
        let json = serde_json::to_string(&SessionDuration::from_secs(100)).unwrap();
        assert_eq!(json, "\"0:01:40\"");
        let back: SessionDuration = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_secs(), 100);
    }

    #[test]
    fn asset_session_mut_is_keyed_by_start_time() {
        let mut session = ProjectSession::new("dragon", "animation");
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        session.asset_session_mut(start).total_time = SessionDuration::from_secs(10);
        session.asset_session_mut(start).total_time = SessionDuration::from_secs(25);

        assert_eq!(session.asset_sessions.len(), 1);
        assert_eq!(session.asset_sessions[0].total_time.as_secs(), 25);
    }

    #[test]
    fn recompute_total_sums_asset_sessions() {
        let mut session = ProjectSession::new("dragon", "animation");
        session
            .asset_session_mut(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
            .total_time = SessionDuration::from_secs(100);
        session
            .asset_session_mut(NaiveTime::from_hms_opt(14, 30, 0).unwrap())
            .total_time = SessionDuration::from_secs(50);

        session.recompute_total();

        assert_eq!(session.total_time.as_secs(), 150);
    }

    #[test]
    fn day_serializes_with_slash_date() {
        let day = Day::new(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        let json = serde_json::to_value(&day).unwrap();
        assert_eq!(json["date"], "02/03/26");
    }

    #[test]
    fn tracker_data_tolerates_missing_fields() {
        let data: TrackerData = serde_json::from_str("{}").unwrap();
        assert!(data.days.is_empty());
        assert!(data.week.is_empty());
    }
}
