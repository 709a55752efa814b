//! Runtime configuration for monitors.
//!
//! Loaded from `config.toml` in the data directory. Every field has a
//! default, so a missing file yields a fully usable config; a malformed file
//! is an error the caller typically downgrades to defaults with a warning.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, ShotclockError};
use crate::paths::DataPaths;

/// Regex applied to a content file path to extract project, asset, and
/// department from its last three directory components.
pub const DEFAULT_PATH_PATTERN: &str = r"(?:^|[/\\])(?P<project>[^/\\]+)[/\\](?P<asset>[^/\\]+)[/\\](?P<department>[^/\\]+)[/\\][^/\\]+$";

/// How much time to subtract from the active session when the user crosses
/// the idle threshold.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClawbackPolicy {
    /// Subtract the idle threshold: the user is assumed active up to the
    /// threshold boundary and idle afterward.
    Threshold,
    /// Subtract the entire observed idle span.
    Full,
    /// Subtract nothing.
    None,
}

impl Default for ClawbackPolicy {
    fn default() -> Self {
        Self::Threshold
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    /// Seconds between polls while the user is active.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Seconds between polls while the user is idle.
    #[serde(default = "default_idle_poll_interval_secs")]
    pub idle_poll_interval_secs: u64,
    /// Seconds of accumulated cycle time between tracker flushes.
    #[serde(default = "default_flush_cycle_secs")]
    pub flush_cycle_secs: u64,
    /// Cap on cumulative "other session" attribution before the session is
    /// considered abandoned for billing purposes.
    #[serde(default = "default_max_other_session_secs")]
    pub max_other_session_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            idle_poll_interval_secs: default_idle_poll_interval_secs(),
            flush_cycle_secs: default_flush_cycle_secs(),
            max_other_session_secs: default_max_other_session_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdleSection {
    /// Seconds without input before the user counts as idle.
    #[serde(default = "default_user_idle_threshold_secs")]
    pub user_idle_threshold_secs: u64,
    #[serde(default)]
    pub clawback: ClawbackPolicy,
}

impl Default for IdleSection {
    fn default() -> Self {
        Self {
            user_idle_threshold_secs: default_user_idle_threshold_secs(),
            clawback: ClawbackPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitySection {
    /// Named captures `project`, `asset`, `department` are required.
    #[serde(default = "default_path_pattern")]
    pub path_pattern: String,
}

impl Default for EntitySection {
    fn default() -> Self {
        Self {
            path_pattern: default_path_pattern(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub idle: IdleSection,
    #[serde(default)]
    pub entity: EntitySection,
}

/// Loads the config from `path`, or from the default data directory when
/// `path` is `None`. A missing file yields `Config::default()`.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(path) => path,
        None => DataPaths::resolve()?.config_file(),
    };

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| ShotclockError::Io {
        context: format!("reading config {}", config_path.display()),
        source,
    })?;
    toml::from_str::<Config>(&content).map_err(|err| ShotclockError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_idle_poll_interval_secs() -> u64 {
    300
}

fn default_flush_cycle_secs() -> u64 {
    300
}

fn default_max_other_session_secs() -> u64 {
    1800
}

fn default_user_idle_threshold_secs() -> u64 {
    2700
}

fn default_path_pattern() -> String {
    DEFAULT_PATH_PATTERN.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing-config.toml");
        let config = load_config(Some(path)).expect("load config");
        assert_eq!(config.monitor.poll_interval_secs, 30);
        assert_eq!(config.monitor.flush_cycle_secs, 300);
        assert_eq!(config.idle.user_idle_threshold_secs, 2700);
        assert_eq!(config.idle.clawback, ClawbackPolicy::Threshold);
    }

    #[test]
    fn load_config_parses_partial_file_with_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
[monitor]
poll_interval_secs = 10

[idle]
clawback = "full"
"#,
        )
        .expect("write config");

        let config = load_config(Some(path)).expect("load config");
        assert_eq!(config.monitor.poll_interval_secs, 10);
        assert_eq!(config.monitor.idle_poll_interval_secs, 300);
        assert_eq!(config.idle.clawback, ClawbackPolicy::Full);
        assert_eq!(config.entity.path_pattern, DEFAULT_PATH_PATTERN);
    }

    #[test]
    fn load_config_rejects_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "not = [valid").expect("write config");

        let err = load_config(Some(path)).expect_err("malformed config");
        assert!(matches!(err, ShotclockError::ConfigMalformed { .. }));
    }

    #[test]
    fn clawback_policy_parses_all_variants() {
        for (raw, expected) in [
            ("threshold", ClawbackPolicy::Threshold),
            ("full", ClawbackPolicy::Full),
            ("none", ClawbackPolicy::None),
        ] {
            let config: Config =
                toml::from_str(&format!("[idle]\nclawback = \"{raw}\"")).expect("parse");
            assert_eq!(config.idle.clawback, expected);
        }
    }
}
