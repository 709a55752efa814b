//! Time sources and drift-corrected elapsed accounting.
//!
//! Monitors never read the system clock directly: they go through [`Clock`]
//! so tests can script wake-ups instead of sleeping. Wall time feeds the
//! ledger (dates, session start keys); the monotonic reading feeds the
//! elapsed accumulator so jittery sleeps still sum to true wall time.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveTime, Timelike};

/// Source of wall-clock and monotonic time for a monitor.
pub trait Clock: Send {
    fn wall_now(&self) -> DateTime<Local>;
    /// Monotonic reading relative to an arbitrary fixed origin.
    fn monotonic_now(&self) -> Duration;
}

/// Production clock backed by `Local::now` and `Instant`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn monotonic_now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Drift-corrected whole-second accounting between polls.
///
/// Each tick yields `floor(delta + carry)` whole seconds and carries the
/// fractional remainder into the next tick, so the sum of increments
/// converges to true elapsed wall time regardless of scheduling jitter.
#[derive(Debug)]
pub struct ElapsedAccumulator {
    last_poll: Duration,
    carry: f64,
}

impl ElapsedAccumulator {
    pub fn new(start: Duration) -> Self {
        Self {
            last_poll: start,
            carry: 0.0,
        }
    }

    /// Re-primes the accumulator, discarding any carried fraction.
    pub fn reset(&mut self, now: Duration) {
        self.last_poll = now;
        self.carry = 0.0;
    }

    /// Whole seconds elapsed since the previous tick. A monotonic reading
    /// older than the previous one counts as zero elapsed.
    pub fn tick(&mut self, now: Duration) -> u64 {
        let delta = now.checked_sub(self.last_poll).unwrap_or_default();
        self.last_poll = now;
        let raw = delta.as_secs_f64() + self.carry;
        let elapsed = raw.floor().max(0.0) as u64;
        self.carry = raw - elapsed as f64;
        elapsed
    }
}

/// Drops sub-second precision so persisted times render as `%H:%M:%S`.
pub fn truncate_to_second(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

/// Manually advanced clock for tests.
///
/// Clones share state, so a handle kept by the test advances the clock a
/// monitor is polling against. Panics on a poisoned lock; this type is test
/// support, not production code.
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockInner>>,
}

#[derive(Debug)]
struct FakeClockInner {
    wall: DateTime<Local>,
    monotonic: Duration,
}

impl FakeClock {
    pub fn starting_at(wall: DateTime<Local>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockInner {
                wall,
                monotonic: Duration::ZERO,
            })),
        }
    }

    /// Advances both wall and monotonic time by `step`.
    pub fn advance(&self, step: Duration) {
        let mut inner = self.inner.lock().expect("fake clock lock");
        inner.monotonic += step;
        inner.wall += chrono::Duration::from_std(step).expect("step within chrono range");
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Clock for FakeClock {
    fn wall_now(&self) -> DateTime<Local> {
        self.inner.lock().expect("fake clock lock").wall
    }

    fn monotonic_now(&self) -> Duration {
        self.inner.lock().expect("fake clock lock").monotonic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tick_counts_whole_seconds() {
        let mut acc = ElapsedAccumulator::new(Duration::ZERO);
        assert_eq!(acc.tick(Duration::from_secs(10)), 10);
        assert_eq!(acc.tick(Duration::from_secs(25)), 15);
    }

    #[test]
    fn tick_carries_fractional_remainder_forward() {
        // Quarter-second steps are exact in binary, so the carry math is
        // deterministic: 10.25, 20.5, 30.75, 41.0.
        let mut acc = ElapsedAccumulator::new(Duration::ZERO);
        let mut total = 0;
        for i in 1..=4u32 {
            total += acc.tick(Duration::from_secs_f64(10.25 * f64::from(i)));
        }
        assert_eq!(total, 41);
    }

    #[test]
    fn tick_sum_never_exceeds_wall_time() {
        let mut acc = ElapsedAccumulator::new(Duration::ZERO);
        let mut now = Duration::ZERO;
        let mut total = 0u64;
        for step in [1.5, 0.25, 9.75, 30.5, 0.5, 299.25, 12.25] {
            now += Duration::from_secs_f64(step);
            total += acc.tick(now);
            assert!(Duration::from_secs(total) <= now);
        }
        // All steps sum to a whole number of seconds, so the carry is spent.
        assert_eq!(total, now.as_secs());
    }

    #[test]
    fn tick_treats_monotonic_regression_as_zero() {
        let mut acc = ElapsedAccumulator::new(Duration::from_secs(100));
        assert_eq!(acc.tick(Duration::from_secs(40)), 0);
        assert_eq!(acc.tick(Duration::from_secs(41)), 1);
    }

    #[test]
    fn reset_discards_carry() {
        let mut acc = ElapsedAccumulator::new(Duration::ZERO);
        acc.tick(Duration::from_secs_f64(0.75));
        acc.reset(Duration::from_secs(1));
        assert_eq!(acc.tick(Duration::from_secs(2)), 1);
    }

    #[test]
    fn fake_clock_advances_wall_and_monotonic_together() {
        let start = Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let clock = FakeClock::starting_at(start);
        let handle = clock.clone();

        handle.advance_secs(90);

        assert_eq!(clock.monotonic_now(), Duration::from_secs(90));
        assert_eq!(
            clock.wall_now(),
            Local.with_ymd_and_hms(2026, 3, 2, 9, 1, 30).unwrap()
        );
    }

    #[test]
    fn truncate_to_second_drops_nanos() {
        let time = NaiveTime::from_hms_nano_opt(9, 0, 0, 123_456_789).unwrap();
        assert_eq!(
            truncate_to_second(time),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
    }
}
