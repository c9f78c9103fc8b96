//! Time source for every poll/sleep loop.
//!
//! Production code uses `SystemClock`. Tests use `ManualClock`, whose `sleep`
//! advances virtual time instantly, so cooldowns and install timeouts can be
//! exercised without waiting on the wall clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Longest single sleep inside a shutdown-aware wait.
const SLEEP_CHUNK: Duration = Duration::from_secs(1);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Virtual clock: `now()` is a fixed origin plus an offset that only moves
/// when `sleep` or `advance` is called.
///
/// An optional `pace` makes each `sleep` also yield for a few real
/// milliseconds, so a poll loop watching a real child process gives it a
/// chance to run.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    pace: Duration,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            pace: Duration::ZERO,
        }
    }

    pub fn paced(pace: Duration) -> Self {
        Self {
            pace,
            ..Self::new()
        }
    }

    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off += d;
        }
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|o| *o).unwrap_or_default()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
        if !self.pace.is_zero() {
            std::thread::sleep(self.pace);
        }
    }
}

/// Sleep for `total` in chunks of at most one second, returning early when
/// `shutdown` is raised. Returns `false` if the wait was interrupted.
pub fn sleep_unless_shutdown(clock: &dyn Clock, total: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = clock.now() + total;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let now = clock.now();
        if now >= deadline {
            return true;
        }
        clock.sleep((deadline - now).min(SLEEP_CHUNK));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_sleep() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        clock.sleep(Duration::from_secs(65));
        assert_eq!(clock.now() - t0, Duration::from_secs(65));
        assert_eq!(clock.elapsed(), Duration::from_secs(65));
    }

    #[test]
    fn sleep_unless_shutdown_runs_to_completion() {
        let clock = ManualClock::new();
        let flag = AtomicBool::new(false);
        assert!(sleep_unless_shutdown(&clock, Duration::from_millis(2500), &flag));
        assert_eq!(clock.elapsed(), Duration::from_millis(2500));
    }

    #[test]
    fn sleep_unless_shutdown_stops_on_flag() {
        let clock = ManualClock::new();
        let flag = AtomicBool::new(true);
        assert!(!sleep_unless_shutdown(&clock, Duration::from_secs(30), &flag));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}
