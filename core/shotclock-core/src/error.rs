//! Error types for shotclock-core operations.

use std::path::PathBuf;

/// All errors that can occur in shotclock-core operations.
///
/// Persistence reads deliberately do not surface through this type: loaders
/// substitute an empty structure and log, so monitors keep polling (see
/// `storage::load_or_default`).
#[derive(Debug, thiserror::Error)]
pub enum ShotclockError {
    #[error("Home directory could not be resolved")]
    HomeDirUnavailable,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid entity pattern: {pattern}: {details}")]
    PatternInvalid { pattern: String, details: String },

    #[error("Invalid duration string: {0}")]
    DurationMalformed(String),

    #[error("No live process found for executable: {0}")]
    ProcessNotFound(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using ShotclockError.
pub type Result<T> = std::result::Result<T, ShotclockError>;
