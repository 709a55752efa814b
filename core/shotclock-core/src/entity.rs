//! Derives the attribution entity (project, asset, department) from the
//! path of the content file a session has open.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{EntitySection, DEFAULT_PATH_PATTERN};
use crate::error::{Result, ShotclockError};

static RE_DEFAULT_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(DEFAULT_PATH_PATTERN).unwrap());

/// Attribution target for one editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntity {
    pub project: String,
    pub asset_name: String,
    pub department: String,
}

/// Compiled path pattern with `project`, `asset` and `department` named
/// capture groups.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    pattern: Regex,
}

impl EntityResolver {
    pub fn new(pattern: &str) -> Result<Self> {
        let compiled = Regex::new(pattern).map_err(|err| ShotclockError::PatternInvalid {
            pattern: pattern.to_string(),
            details: err.to_string(),
        })?;
        Ok(Self { pattern: compiled })
    }

    pub fn from_config(entity: &EntitySection) -> Result<Self> {
        Self::new(&entity.path_pattern)
    }

    /// Entity for a content path. A path the pattern does not recognize
    /// falls back to an "unsorted" entity so attribution never fails.
    pub fn resolve(&self, path: &str) -> SessionEntity {
        if let Some(caps) = self.pattern.captures(path) {
            let field = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
            if let (Some(project), Some(asset_name), Some(department)) =
                (field("project"), field("asset"), field("department"))
            {
                return SessionEntity {
                    project,
                    asset_name,
                    department,
                };
            }
        }
        fallback_entity(path)
    }
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self {
            pattern: RE_DEFAULT_PATH.clone(),
        }
    }
}

fn fallback_entity(path: &str) -> SessionEntity {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("untitled");
    SessionEntity {
        project: "unsorted".to_string(),
        asset_name: stem.to_string(),
        department: "general".to_string(),
    }
}
