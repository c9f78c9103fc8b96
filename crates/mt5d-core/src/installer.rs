//! Bounded wait around a GUI installer running under Wine.
//!
//! Windows installers frequently keep running (or spawn the installed program)
//! after the payload is on disk, so the wait ends as soon as the expected
//! target file appears, not only when the child exits.

use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::clock::Clock;
use crate::error::Result;
use crate::procs;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Grace given to the installer between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerOutcome {
    Exited(ExitStatus),
    TargetAppeared,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct InstallerWatch {
    pub target: PathBuf,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Command-line fragments of stray processes to kill once the wait ends
    /// early (the installer's own helpers, an auto-started terminal).
    pub stray_patterns: Vec<String>,
}

impl InstallerWatch {
    pub fn new(target: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stray_patterns: Vec::new(),
        }
    }

    pub fn kill_strays(mut self, patterns: &[&str]) -> Self {
        self.stray_patterns = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Poll `child` until it exits, `target` appears, or the timeout passes.
    pub fn wait(&self, mut child: Child, clock: &dyn Clock) -> Result<InstallerOutcome> {
        let deadline = clock.now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                tracing::info!(%status, "installer exited");
                return Ok(InstallerOutcome::Exited(status));
            }
            if self.target.exists() {
                tracing::info!(target = %self.target.display(), "install target appeared");
                self.stop(&mut child, clock)?;
                return Ok(InstallerOutcome::TargetAppeared);
            }
            let now = clock.now();
            if now >= deadline {
                tracing::warn!(secs = self.timeout.as_secs(), "installer timed out");
                self.stop(&mut child, clock)?;
                return Ok(InstallerOutcome::TimedOut);
            }
            clock.sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn stop(&self, child: &mut Child, clock: &dyn Clock) -> Result<()> {
        procs::terminate_child(child, KILL_GRACE, clock)?;
        for pattern in &self.stray_patterns {
            procs::signal_matching(pattern, Signal::SIGKILL)?;
        }
        Ok(())
    }
}

/// Whether `path` exists after an installer run, whatever the outcome was.
pub fn verify_installed(path: &Path, outcome: InstallerOutcome) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }
    Err(crate::error::Mt5dError::Verification(format!(
        "{} missing after installer ({outcome:?})",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use std::process::Command;
    use tempfile::TempDir;

    fn sleeper() -> Child {
        procs::spawn_in_group(Command::new("sleep").arg("30")).unwrap()
    }

    #[test]
    fn target_appearing_ends_wait_and_kills_child() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("terminal64.exe");
        std::fs::write(&target, "MZ").unwrap();
        let clock = ManualClock::new();

        let watch = InstallerWatch::new(&target, Duration::from_secs(300));
        let outcome = watch.wait(sleeper(), &clock).unwrap();
        assert_eq!(outcome, InstallerOutcome::TargetAppeared);
        assert!(verify_installed(&target, outcome).is_ok());
    }

    #[test]
    fn timeout_is_bounded_in_virtual_time() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("terminal64.exe");
        let clock = ManualClock::new();

        let watch = InstallerWatch::new(&target, Duration::from_secs(20));
        let outcome = watch.wait(sleeper(), &clock).unwrap();
        assert_eq!(outcome, InstallerOutcome::TimedOut);
        assert!(clock.elapsed() >= Duration::from_secs(20));
        assert!(verify_installed(&target, outcome).is_err());
    }

    #[test]
    fn child_exit_is_reported() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("terminal64.exe");
        let child = Command::new("sh").args(["-c", "exit 0"]).spawn().unwrap();

        let mut watch = InstallerWatch::new(&target, Duration::from_secs(30));
        watch.poll_interval = Duration::from_millis(20);
        let outcome = watch.wait(child, &SystemClock).unwrap();
        assert!(matches!(outcome, InstallerOutcome::Exited(s) if s.success()));
        // Exited cleanly but installed nothing: still a failure.
        assert!(verify_installed(&target, outcome).is_err());
    }
}
