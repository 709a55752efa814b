//! Tracing setup for the agent: stderr plus the shared log file that weekly
//! archival rotates.

use shotclock_core::DataPaths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Initializes tracing. The returned guard must live as long as the process
/// so buffered file writes are flushed on exit.
pub fn init(paths: &DataPaths) -> Option<WorkerGuard> {
    let debug_enabled = std::env::var("SHOTCLOCK_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Stderr-only when the data root cannot be prepared; logging must never
    // keep the agent from running.
    if paths.ensure_dirs().is_err() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::never(paths.root(), "shotclock.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr.and(file_writer))
        .with_ansi(false)
        .init();
    Some(guard)
}
