//! shotclock-agent: per-session polling agent for usage-time tracking.
//!
//! Launched by a host application's file-open hook with the content file and
//! executable of the editing session. The agent owns one monitor, polls
//! until the session ends, and exits.
//!
//! ## Subcommands
//!
//! - `run`: Track one editing session until its process exits
//! - `inspect`: Print the shared registry and today's attributed totals

mod inspect;
mod logging;

use clap::{Parser, Subcommand};
use shotclock_core::{
    load_config, Config, DataPaths, SessionMonitor, SystemClock, SystemProbe,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "shotclock-agent")]
#[command(about = "Editing-session usage time tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track one editing session until its process exits (called by
    /// file-open hooks)
    Run {
        /// Content file opened in the editing session
        #[arg(long)]
        file: String,

        /// Executable name hosting the session (e.g. "maya")
        #[arg(long)]
        executable: String,

        /// Process id of the session; omitted means resolve by executable
        #[arg(long)]
        pid: Option<u32>,
    },

    /// Print the shared registry and today's attributed totals
    Inspect,
}

fn main() {
    let paths = match DataPaths::resolve() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("shotclock-agent: {err}");
            std::process::exit(1);
        }
    };
    let _logging_guard = logging::init(&paths);
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            executable,
            pid,
        } => {
            if let Err(err) = run_session(&paths, &file, &executable, pid) {
                error!(error = %err, "shotclock-agent run failed");
                std::process::exit(1);
            }
        }
        Commands::Inspect => inspect::run(&paths),
    }
}

fn run_session(
    paths: &DataPaths,
    file: &str,
    executable: &str,
    pid: Option<u32>,
) -> shotclock_core::Result<()> {
    // A broken config file downgrades to defaults; losing a session's hours
    // over a typo in config.toml is worse than ignoring the typo.
    let config = match load_config(Some(paths.config_file())) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Config unusable, falling back to defaults");
            Config::default()
        }
    };

    let mut monitor = SessionMonitor::new(SystemProbe::new(), SystemClock::new(), paths, config)?;
    let pid = monitor.add_process(file, executable, pid)?;
    info!(pid, file, executable, monitor = %monitor.id(), "Session registered");
    monitor.run();
    Ok(())
}
