//! # shotclock-core
//!
//! Core library for shotclock, attributing wall-clock usage time of editing
//! sessions to the project, asset and department the open file belongs to.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. One monitor is one plain
//!   polling loop.
//! - **Fail-soft**: A monitor must never take the host editing session down.
//!   Missing or corrupt data files read as empty, unanswerable OS queries
//!   skip a cycle, failed writes are retried by the next flush.
//! - **Multi-writer safe**: Several monitor processes share the registry and
//!   ledger files; every mutation is a read-merge-write of the caller's own
//!   slice, never a blind overwrite.
//! - **Idempotent persistence**: Session totals are absolute values keyed by
//!   start time, so replaying a flush can never double-count.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shotclock_core::{Config, DataPaths, SessionMonitor, SystemClock, SystemProbe};
//!
//! let paths = DataPaths::resolve()?;
//! let config = shotclock_core::load_config(None)?;
//! let mut monitor = SessionMonitor::new(SystemProbe::new(), SystemClock::new(), &paths, config)?;
//! monitor.add_process("/projects/wizard/dragon/animation/dragon_v001.ma", "maya", None)?;
//! monitor.run();
//! ```

// Public modules
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod monitor;
pub mod paths;
pub mod probe;
pub mod registry;
pub mod storage;
pub mod tracker;

// Re-export commonly used items at crate root
pub use clock::{Clock, ElapsedAccumulator, FakeClock, SystemClock};
pub use config::{load_config, ClawbackPolicy, Config, EntitySection, IdleSection, MonitorSection};
pub use entity::{EntityResolver, SessionEntity};
pub use error::{Result, ShotclockError};
pub use monitor::{MonitorState, SessionMonitor};
pub use paths::DataPaths;
pub use probe::{DesktopProbe, FakeProbe, SystemProbe, WindowInfo};
pub use registry::{LastActive, ProcessMap, ProcessRegistry, ProcessStatus, TrackedProcess};
pub use tracker::store::{week_description, BackupIndex, TrackerStore, WeeklyBackup};
pub use tracker::types::{
    AssetSession, Day, Project, ProjectSession, SessionDuration, TrackerData,
};
