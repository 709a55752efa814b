//! Per-session polling monitor.
//!
//! One monitor runs per open editing session, spawned by the host's
//! file-open hook. Each poll cycle it measures elapsed wall time, checks
//! user idleness, sweeps its processes for liveness, and, while the user is
//! present, attributes the elapsed seconds to whichever of its sessions
//! holds the foreground (or, within a bound, to the last active one), then
//! publishes its slice of the shared registry. Accumulated time reaches the
//! ledger on a periodic flush and on termination.
//!
//! Monitors are deliberately fail-soft: a cycle that cannot answer an OS
//! query skips attribution for that cycle, and a failed write is retried by
//! the next cycle's flush rather than crashing the host's editing session.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::clock::{truncate_to_second, Clock, ElapsedAccumulator};
use crate::config::{ClawbackPolicy, Config};
use crate::entity::EntityResolver;
use crate::error::{Result, ShotclockError};
use crate::paths::DataPaths;
use crate::probe::DesktopProbe;
use crate::registry::{ProcessMap, ProcessRegistry, ProcessStatus, TrackedProcess};
use crate::tracker::store::TrackerStore;

/// Poll-loop states. `Flushing` is transient within a single cycle.
/// `Stopped` is terminal until a new process is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Sampling,
    Idle,
    Flushing,
    Stopped,
}

pub struct SessionMonitor<P: DesktopProbe, C: Clock> {
    id: String,
    probe: P,
    clock: C,
    config: Config,
    registry: ProcessRegistry,
    tracker: TrackerStore,
    resolver: EntityResolver,
    state: MonitorState,
    /// This monitor's slice of the registry, mutated in memory during a
    /// cycle and published through `upsert` at the end of it.
    owned: ProcessMap,
    accumulator: ElapsedAccumulator,
    /// Wall seconds accumulated toward the next periodic flush.
    cycle_secs: u64,
    /// Seconds attributed to the last active session while other windows
    /// held the foreground, since its last foreground cycle.
    other_session_secs: u64,
    last_active_pid: Option<u32>,
    wait: Duration,
}

impl<P: DesktopProbe, C: Clock> SessionMonitor<P, C> {
    pub fn new(probe: P, clock: C, paths: &DataPaths, config: Config) -> Result<Self> {
        paths.ensure_dirs()?;
        let resolver = EntityResolver::from_config(&config.entity)?;
        let accumulator = ElapsedAccumulator::new(clock.monotonic_now());
        let wait = Duration::from_secs(config.monitor.poll_interval_secs);
        Ok(Self {
            id: Ulid::new().to_string(),
            probe,
            clock,
            config,
            registry: ProcessRegistry::new(paths),
            tracker: TrackerStore::new(paths),
            resolver,
            state: MonitorState::Sampling,
            owned: ProcessMap::new(),
            accumulator,
            cycle_secs: 0,
            other_session_secs: 0,
            last_active_pid: None,
            wait,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Current sleep interval: short while sampling, long while idle.
    pub fn poll_interval(&self) -> Duration {
        self.wait
    }

    pub fn owned_pids(&self) -> Vec<u32> {
        self.owned.keys().copied().collect()
    }

    /// Registers an editing session under this monitor.
    ///
    /// With `pid` absent the process table is searched for a not-yet-tracked
    /// process of `executable`. A pid another monitor already tracks has its
    /// accumulated time flushed to the ledger first and is then re-homed
    /// here with a fresh session, so no attribution is lost and at most one
    /// monitor owns a pid at a time. Registering on a stopped monitor
    /// revives it.
    pub fn add_process(&mut self, path: &str, executable: &str, pid: Option<u32>) -> Result<u32> {
        let registered = self.registry.read_all();
        let pid = match pid {
            Some(pid) => pid,
            None => self.resolve_new_pid(executable, &registered)?,
        };

        if let Some(existing) = registered.get(&pid) {
            info!(
                pid,
                previous_owner = %existing.owner,
                monitor = %self.id,
                "Pid already tracked, flushing before re-home"
            );
            let entity = self.resolver.resolve(&existing.path);
            self.tracker.merge_session(
                &entity,
                existing.seconds,
                existing.first_seen,
                self.clock.wall_now(),
            )?;
        }

        if self.state == MonitorState::Stopped {
            info!(monitor = %self.id, "Reviving stopped monitor for new session");
            self.state = MonitorState::Sampling;
            self.accumulator.reset(self.clock.monotonic_now());
            self.cycle_secs = 0;
            self.other_session_secs = 0;
            self.wait = Duration::from_secs(self.config.monitor.poll_interval_secs);
        }

        let record = TrackedProcess {
            path: path.to_string(),
            executable: executable.to_string(),
            seconds: 0,
            status: ProcessStatus::Active,
            idle_secs: 0,
            first_seen: truncate_to_second(self.clock.wall_now().time()),
            owner: self.id.clone(),
        };
        self.registry.register(pid, record.clone())?;
        self.owned.insert(pid, record);
        self.last_active_pid = Some(pid);
        info!(pid, path, executable, monitor = %self.id, "Tracking editing session");
        Ok(pid)
    }

    fn resolve_new_pid(&self, executable: &str, registered: &ProcessMap) -> Result<u32> {
        self.probe
            .pids_by_executable(executable)
            .into_iter()
            .find(|pid| !registered.contains_key(pid))
            .ok_or_else(|| ShotclockError::ProcessNotFound(executable.to_string()))
    }

    /// One poll transition. Faults are logged and absorbed; the loop picks
    /// up again at the next wake.
    pub fn poll_once(&mut self) -> MonitorState {
        if self.state == MonitorState::Stopped {
            return MonitorState::Stopped;
        }
        match self.cycle() {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, monitor = %self.id, "Poll cycle failed, continuing");
                self.state
            }
        }
    }

    /// Blocking poll loop with real sleeps; returns once the monitor stops.
    pub fn run(&mut self) {
        info!(
            monitor = %self.id,
            interval_secs = self.wait.as_secs(),
            "Monitor loop started"
        );
        while self.state != MonitorState::Stopped {
            thread::sleep(self.wait);
            self.poll_once();
        }
        info!(monitor = %self.id, "Monitor loop finished");
    }

    /// Final flush and terminal stop. Safe to call repeatedly: once the
    /// owned set is cleared a second stop performs no writes.
    pub fn stop(&mut self) {
        if self.state == MonitorState::Stopped {
            return;
        }
        let now = self.clock.wall_now();
        if let Err(err) = self.flush_terminal(now) {
            warn!(error = %err, monitor = %self.id, "Final flush failed");
        }
        self.state = MonitorState::Stopped;
        info!(monitor = %self.id, "Monitor stopped");
    }

    fn cycle(&mut self) -> Result<MonitorState> {
        let now = self.clock.wall_now();
        let elapsed = self.accumulator.tick(self.clock.monotonic_now());
        self.cycle_secs += elapsed;

        let idle = self.probe.user_idle_secs();
        self.step_idle_state(idle, now)?;

        self.sweep_liveness();
        let all_stale = self
            .owned
            .values()
            .all(|record| record.status == ProcessStatus::Stale);
        if self.owned.is_empty() || all_stale {
            info!(monitor = %self.id, "No live sessions remain, stopping");
            self.flush_terminal(now)?;
            self.state = MonitorState::Stopped;
            return Ok(MonitorState::Stopped);
        }

        // No idle answer means no attribution this cycle, and an idle user
        // earns nothing until activity resumes.
        if idle.is_none() {
            debug!(monitor = %self.id, "Idle state unknown, skipping attribution");
        } else if self.state == MonitorState::Idle {
            debug!(monitor = %self.id, "User idle, not attributing");
        } else {
            match self.probe.foreground_window() {
                Some(window) => {
                    debug!(
                        window_pid = window.pid,
                        title = %window.title,
                        monitor = %self.id,
                        "Foreground window"
                    );
                    self.attribute(window.pid, elapsed)?;
                }
                None => {
                    debug!(monitor = %self.id, "Foreground unknown, skipping attribution");
                }
            }
        }

        self.publish_owned()?;

        if self.cycle_secs >= self.config.monitor.flush_cycle_secs {
            let resume = self.state;
            self.state = MonitorState::Flushing;
            debug!(monitor = %self.id, "Flush cycle reached, merging owned sessions");
            let flushed = self.flush_owned(now);
            self.state = resume;
            flushed?;
            // Only a completed flush restarts the cycle; a failed one is
            // retried at the next poll.
            self.cycle_secs = 0;
        }

        Ok(self.state)
    }

    /// Step 4: publish this monitor's slice and adopt the file's view of
    /// ownership, dropping entries other monitors re-homed away since the
    /// last cycle.
    fn publish_owned(&mut self) -> Result<()> {
        let merged = self.registry.upsert(&self.owned, &self.id)?;
        let before = self.owned.len();
        self.owned = merged
            .into_iter()
            .filter(|(_, record)| record.owner == self.id)
            .collect();
        if self.owned.len() < before {
            info!(
                monitor = %self.id,
                lost = before - self.owned.len(),
                "Sessions re-homed to another monitor"
            );
        }
        Ok(())
    }

    /// Step 1 of the cycle: idle threshold handling. Clawback fires only on
    /// the Sampling→Idle edge, so one idle stretch corrects the ledger once.
    fn step_idle_state(&mut self, idle: Option<u64>, now: DateTime<Local>) -> Result<()> {
        match idle {
            Some(idle_secs) if idle_secs >= self.config.idle.user_idle_threshold_secs => {
                if self.state != MonitorState::Idle {
                    self.apply_clawback(idle_secs, now)?;
                    self.state = MonitorState::Idle;
                    self.wait = Duration::from_secs(self.config.monitor.idle_poll_interval_secs);
                    info!(idle_secs, monitor = %self.id, "User idle, polling slowly");
                }
            }
            Some(_) => {
                if self.state == MonitorState::Idle {
                    debug!(monitor = %self.id, "User active again, polling normally");
                }
                self.state = MonitorState::Sampling;
                self.wait = Duration::from_secs(self.config.monitor.poll_interval_secs);
            }
            None => {}
        }
        Ok(())
    }

    /// Step 2: mark owned processes whose OS process has exited.
    fn sweep_liveness(&mut self) {
        for (pid, record) in self.owned.iter_mut() {
            if record.status != ProcessStatus::Stale && !self.probe.pid_alive(*pid) {
                info!(pid = *pid, monitor = %self.id, "Tracked process exited");
                record.status = ProcessStatus::Stale;
            }
        }
    }

    /// Step 3: credit `elapsed` seconds. A foreground match on an owned live
    /// session earns directly and resets the other-session bound; any other
    /// foreground earns for the last active session until the bound is spent.
    /// Not called while the monitor is idle.
    fn attribute(&mut self, window_pid: u32, elapsed: u64) -> Result<()> {
        if let Some(record) = self.owned.get_mut(&window_pid) {
            if record.status != ProcessStatus::Stale {
                record.seconds += elapsed;
                record.idle_secs = 0;
                record.status = ProcessStatus::Active;
                let snapshot = record.clone();
                self.last_active_pid = Some(window_pid);
                self.other_session_secs = 0;
                self.registry.set_last_active(window_pid, &snapshot)?;
                return Ok(());
            }
        }

        let Some(target) = self.other_session_target() else {
            // No verifiable last-active session; restart the bound.
            self.other_session_secs = 0;
            return Ok(());
        };
        if self.other_session_secs >= self.config.monitor.max_other_session_secs {
            debug!(
                monitor = %self.id,
                target,
                "Other-session bound spent, not attributing"
            );
            return Ok(());
        }
        if let Some(record) = self.owned.get_mut(&target) {
            if record.status != ProcessStatus::Stale {
                record.seconds += elapsed;
                self.other_session_secs += elapsed;
            }
        }
        Ok(())
    }

    /// Last-active session eligible for other-session credit. The in-memory
    /// pointer wins; the shared pointer is consulted as fallback and trusted
    /// only when the registry still records this monitor as its owner.
    fn other_session_target(&self) -> Option<u32> {
        if let Some(pid) = self.last_active_pid {
            if self.owned.contains_key(&pid) {
                return Some(pid);
            }
        }
        self.registry
            .get_last_active(&self.id)
            .map(|last| last.pid)
            .filter(|pid| self.owned.contains_key(pid))
    }

    /// Retroactive idle correction at the Sampling→Idle edge: the user is
    /// taken to have left at the threshold boundary, so seconds recorded
    /// past it come back off the last active session and the ledger is
    /// updated immediately.
    fn apply_clawback(&mut self, observed_idle_secs: u64, now: DateTime<Local>) -> Result<()> {
        let amount = match self.config.idle.clawback {
            ClawbackPolicy::Threshold => self.config.idle.user_idle_threshold_secs,
            ClawbackPolicy::Full => observed_idle_secs,
            ClawbackPolicy::None => 0,
        };
        if amount == 0 {
            return Ok(());
        }
        let Some(pid) = self.other_session_target() else {
            return Ok(());
        };
        let Some(record) = self.owned.get_mut(&pid) else {
            return Ok(());
        };
        let before = record.seconds;
        record.seconds = record.seconds.saturating_sub(amount);
        info!(
            pid,
            clawed_back = before - record.seconds,
            monitor = %self.id,
            "Idle clawback applied"
        );
        let entity = self.resolver.resolve(&record.path);
        let (seconds, first_seen) = (record.seconds, record.first_seen);
        self.tracker.merge_session(&entity, seconds, first_seen, now)?;
        Ok(())
    }

    /// Periodic flush: merge every owned session into the ledger, then step
    /// statuses. Active drops to Inactive until re-earned, Inactive ages its
    /// idle counter, Stale leaves the registry once its process is gone.
    /// Statuses step only after every merge has landed, so a flush that
    /// fails partway is retried next cycle without aging anything twice.
    fn flush_owned(&mut self, now: DateTime<Local>) -> Result<()> {
        for record in self.owned.values() {
            let entity = self.resolver.resolve(&record.path);
            self.tracker
                .merge_session(&entity, record.seconds, record.first_seen, now)?;
        }

        let flush_cycle = self.config.monitor.flush_cycle_secs;
        let mut departed: Vec<u32> = Vec::new();
        for (pid, record) in self.owned.iter_mut() {
            match record.status {
                ProcessStatus::Active => record.status = ProcessStatus::Inactive,
                ProcessStatus::Inactive => record.idle_secs += flush_cycle,
                ProcessStatus::Stale => {
                    if !self.probe.pid_alive(*pid) {
                        departed.push(*pid);
                    }
                }
            }
        }

        if !departed.is_empty() {
            self.registry.remove(&departed, &self.id)?;
            for pid in &departed {
                self.owned.remove(pid);
            }
        }
        // Stepped statuses become visible to other monitors right away.
        self.publish_owned()
    }

    /// Terminal flush: merge everything, then take this monitor's entries
    /// out of the registry.
    fn flush_terminal(&mut self, now: DateTime<Local>) -> Result<()> {
        for record in self.owned.values() {
            let entity = self.resolver.resolve(&record.path);
            self.tracker
                .merge_session(&entity, record.seconds, record.first_seen, now)?;
        }
        let pids: Vec<u32> = self.owned.keys().copied().collect();
        if !pids.is_empty() {
            self.registry.remove(&pids, &self.id)?;
        }
        self.owned.clear();
        Ok(())
    }
}
