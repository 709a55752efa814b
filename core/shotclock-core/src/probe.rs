//! Desktop state queries: foreground window, user idle time, process table.
//!
//! All OS facts enter the monitor through [`DesktopProbe`]. Queries that the
//! current platform or host integration cannot answer return `None`, and the
//! monitor skips attribution for that cycle rather than guessing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use sysinfo::{ProcessRefreshKind, System};

/// Foreground window snapshot at poll time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub pid: u32,
    pub title: String,
    pub executable_path: String,
}

/// Read-only view of the desktop and process table.
pub trait DesktopProbe: Send {
    /// Currently focused window, or `None` when the question cannot be
    /// answered (headless host, unsupported platform, transient OS error).
    fn foreground_window(&self) -> Option<WindowInfo>;

    /// Seconds since the last user input, or `None` when unknowable.
    fn user_idle_secs(&self) -> Option<u64>;

    fn pid_alive(&self, pid: u32) -> bool;

    /// Pids whose executable name matches `executable`, sorted ascending.
    /// Matching ignores case and any file extension.
    fn pids_by_executable(&self, executable: &str) -> Vec<u32>;
}

/// Probe backed by the real process table.
///
/// Foreground and idle queries answer `None` here; host integrations that
/// can see the compositor supply their own [`DesktopProbe`].
#[derive(Debug, Default)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }
}

impl DesktopProbe for SystemProbe {
    fn foreground_window(&self) -> Option<WindowInfo> {
        None
    }

    fn user_idle_secs(&self) -> Option<u64> {
        None
    }

    fn pid_alive(&self, pid: u32) -> bool {
        process_exists(pid)
    }

    fn pids_by_executable(&self, executable: &str) -> Vec<u32> {
        let target = normalize_executable(executable);
        let mut sys = System::new();
        sys.refresh_processes_specifics(ProcessRefreshKind::new());
        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(_, process)| normalize_executable(process.name()) == target)
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    // SAFETY: kill(pid, 0) sends no signal and only reports whether the
    // process exists for the calling user.
    #[allow(unsafe_code)]
    let alive = unsafe { libc::kill(pid as i32, 0) == 0 };
    alive
}

#[cfg(not(unix))]
fn process_exists(pid: u32) -> bool {
    let sys_pid = sysinfo::Pid::from(pid as usize);
    let mut sys = System::new();
    sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new());
    sys.process(sys_pid).is_some()
}

/// Case-insensitive executable stem: "Maya.exe", "maya", "MAYA" all match.
fn normalize_executable(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name);
    stem.to_ascii_lowercase()
}

/// Scriptable probe for tests. Clones share state.
///
/// Foreground and idle answers are sticky: a value set once holds until the
/// test changes it, and queued values (if any) are consumed one per call
/// before the sticky value applies. Panics on a poisoned lock; this type is
/// test support, not production code.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    state: Arc<Mutex<FakeProbeState>>,
}

#[derive(Debug, Default)]
struct FakeProbeState {
    foreground: Option<WindowInfo>,
    foreground_queue: VecDeque<Option<WindowInfo>>,
    idle_secs: Option<u64>,
    dead: BTreeSet<u32>,
    by_executable: BTreeMap<String, Vec<u32>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sticky foreground answer. [`FakeProbe::focus_on`] is a
    /// shorthand that builds a plausible [`WindowInfo`] for a pid.
    pub fn set_foreground(&self, window: Option<WindowInfo>) {
        self.state.lock().expect("fake probe lock").foreground = window;
    }

    pub fn focus_on(&self, pid: u32) {
        self.set_foreground(Some(WindowInfo {
            pid,
            title: format!("window of pid {pid}"),
            executable_path: "/usr/bin/editor".to_string(),
        }));
    }

    /// Queues one-shot foreground answers consumed ahead of the sticky value.
    pub fn queue_foreground(&self, window: Option<WindowInfo>) {
        self.state
            .lock()
            .expect("fake probe lock")
            .foreground_queue
            .push_back(window);
    }

    pub fn set_user_idle_secs(&self, idle: Option<u64>) {
        self.state.lock().expect("fake probe lock").idle_secs = idle;
    }

    pub fn set_alive(&self, pid: u32, alive: bool) {
        let mut state = self.state.lock().expect("fake probe lock");
        if alive {
            state.dead.remove(&pid);
        } else {
            state.dead.insert(pid);
        }
    }

    pub fn set_pids_for_executable(&self, executable: &str, pids: Vec<u32>) {
        self.state
            .lock()
            .expect("fake probe lock")
            .by_executable
            .insert(executable.to_string(), pids);
    }
}

impl DesktopProbe for FakeProbe {
    fn foreground_window(&self) -> Option<WindowInfo> {
        let mut state = self.state.lock().expect("fake probe lock");
        if let Some(queued) = state.foreground_queue.pop_front() {
            return queued;
        }
        state.foreground.clone()
    }

    fn user_idle_secs(&self) -> Option<u64> {
        self.state.lock().expect("fake probe lock").idle_secs
    }

    fn pid_alive(&self, pid: u32) -> bool {
        !self.state.lock().expect("fake probe lock").dead.contains(&pid)
    }

    fn pids_by_executable(&self, executable: &str) -> Vec<u32> {
        self.state
            .lock()
            .expect("fake probe lock")
            .by_executable
            .get(executable)
            .cloned()
            .unwrap_or_default()
    }
}
