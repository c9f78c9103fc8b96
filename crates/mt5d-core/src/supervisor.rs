//! Owner of the terminal and bridge processes.
//!
//! Launches both once provisioning is complete, services restart tokens left
//! by the monitor, and terminates its children on shutdown. Children are kept
//! as explicit handles so they are always reaped.

use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::clock::{sleep_unless_shutdown, Clock};
use crate::config::Settings;
use crate::error::Result;
use crate::launch;
use crate::paths;
use crate::probe::Probe;
use crate::procs;
use crate::signals::{RestartToken, StartupMarker};

const READINESS_POLL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub token_poll: Duration,
    /// Time between SIGTERM and SIGKILL.
    pub grace: Duration,
    pub terminal_start_timeout: Duration,
    pub bridge_start_timeout: Duration,
    /// Pause after a restart before the token is cleared.
    pub settle: Duration,
    /// Also signal unmanaged processes whose command line matches the
    /// terminal or bridge (leftovers from an earlier supervisor).
    pub sweep_strays: bool,
}

impl SupervisorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            token_poll: Duration::from_secs(5),
            grace: Duration::from_secs(10),
            terminal_start_timeout: settings.terminal_start_timeout(),
            bridge_start_timeout: Duration::from_secs(60),
            settle: Duration::from_secs(10),
            sweep_strays: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ManagedProcess
// ---------------------------------------------------------------------------

/// A supervised child, leader of its own process group.
#[derive(Debug)]
pub struct ManagedProcess {
    name: &'static str,
    child: Child,
}

impl ManagedProcess {
    pub fn spawn(name: &'static str, mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::null());
        let child = procs::spawn_in_group(&mut cmd)?;
        tracing::info!(process = name, pid = child.id(), "started");
        Ok(Self { name, child })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn exited(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    pub fn terminate(mut self, grace: Duration, clock: &dyn Clock) -> Result<()> {
        procs::terminate_child(&mut self.child, grace, clock)?;
        tracing::info!(process = self.name, pid = self.child.id(), "stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor<'a, P> {
    settings: &'a Settings,
    probe: P,
    clock: &'a dyn Clock,
    options: SupervisorOptions,
    marker: StartupMarker,
    token: RestartToken,
    terminal: Option<ManagedProcess>,
    bridge: Option<ManagedProcess>,
}

impl<'a, P: Probe> Supervisor<'a, P> {
    pub fn new(settings: &'a Settings, probe: P, clock: &'a dyn Clock) -> Self {
        Self::with_options(settings, probe, clock, SupervisorOptions::from_settings(settings))
    }

    pub fn with_options(
        settings: &'a Settings,
        probe: P,
        clock: &'a dyn Clock,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            settings,
            probe,
            clock,
            options,
            marker: StartupMarker::new(&settings.startup_marker),
            token: RestartToken::new(&settings.restart_token),
            terminal: None,
            bridge: None,
        }
    }

    pub fn terminal(&self) -> Option<&ManagedProcess> {
        self.terminal.as_ref()
    }

    pub fn bridge(&self) -> Option<&ManagedProcess> {
        self.bridge.as_ref()
    }

    /// Poll `probe_ok` until it holds or `timeout` passes.
    fn wait_until(&self, timeout: Duration, probe_ok: impl Fn(&P) -> bool) -> bool {
        let deadline = self.clock.now() + timeout;
        loop {
            if probe_ok(&self.probe) {
                return true;
            }
            let now = self.clock.now();
            if now >= deadline {
                return false;
            }
            self.clock.sleep(READINESS_POLL.min(deadline - now));
        }
    }

    // -----------------------------------------------------------------------
    // Start / stop
    // -----------------------------------------------------------------------

    pub fn start_terminal(&mut self) -> Result<()> {
        if self.settings.credentials().is_none() {
            tracing::info!("no credentials configured, terminal starts in manual-login mode");
        }
        self.terminal = Some(ManagedProcess::spawn(
            "terminal",
            launch::terminal_command(self.settings),
        )?);
        let timeout = self.options.terminal_start_timeout;
        if !self.wait_until(timeout, |p| p.process_running(paths::TERMINAL_EXE)) {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "terminal process not seen before timeout, leaving it to the health monitor"
            );
        }
        Ok(())
    }

    pub fn start_bridge(&mut self) -> Result<()> {
        self.bridge = Some(ManagedProcess::spawn(
            "bridge",
            launch::bridge_command(self.settings),
        )?);
        let port = self.settings.bridge_port;
        let timeout = self.options.bridge_start_timeout;
        if self.wait_until(timeout, |p| p.port_listening(port)) {
            tracing::info!(port, "bridge listening");
        } else {
            tracing::warn!(port, timeout_secs = timeout.as_secs(), "bridge port not listening before timeout");
        }
        Ok(())
    }

    pub fn start_all(&mut self) -> Result<()> {
        self.start_terminal()?;
        self.start_bridge()
    }

    pub fn stop_bridge(&mut self) -> Result<()> {
        if let Some(proc) = self.bridge.take() {
            proc.terminate(self.options.grace, self.clock)?;
        }
        self.sweep(paths::BRIDGE_SCRIPT)
    }

    pub fn stop_terminal(&mut self) -> Result<()> {
        if let Some(proc) = self.terminal.take() {
            proc.terminate(self.options.grace, self.clock)?;
        }
        self.sweep(paths::TERMINAL_EXE)
    }

    /// Bridge first: it holds a session to the terminal.
    pub fn stop_all(&mut self) -> Result<()> {
        self.stop_bridge()?;
        self.stop_terminal()
    }

    fn sweep(&self, pattern: &str) -> Result<()> {
        if self.options.sweep_strays {
            procs::signal_matching(pattern, Signal::SIGKILL)?;
        }
        Ok(())
    }

    pub fn full_restart(&mut self) -> Result<()> {
        self.stop_all()?;
        self.start_all()?;
        self.clock.sleep(self.options.settle);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Restart tokens
    // -----------------------------------------------------------------------

    /// Perform a full restart if a token is pending, then consume it.
    /// Returns whether a restart happened.
    pub fn service_token(&mut self) -> Result<bool> {
        let Some(reason) = self.token.peek()? else {
            return Ok(false);
        };
        tracing::warn!(%reason, "restart requested");
        self.full_restart()?;
        self.token.clear()?;
        tracing::info!("restart complete");
        Ok(true)
    }

    /// Drop handles of children that exited on their own.
    pub fn reap(&mut self) -> Result<()> {
        for slot in [&mut self.terminal, &mut self.bridge] {
            let exited = match slot.as_mut() {
                Some(proc) => proc.exited()?.map(|status| (proc.name(), status)),
                None => None,
            };
            if let Some((name, status)) = exited {
                tracing::warn!(process = name, %status, "exited unexpectedly");
                *slot = None;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let mut announced = false;
        while !self.marker.is_set() {
            if !announced {
                tracing::info!(path = %self.marker.path().display(), "waiting for startup to complete");
                announced = true;
            }
            if !sleep_unless_shutdown(self.clock, self.options.token_poll, shutdown) {
                return Ok(());
            }
        }

        if self.token.clear()? {
            tracing::info!("discarded restart token left from a previous run");
        }
        let result = self.start_all().and_then(|()| self.service_loop(shutdown));
        let stopped = self.stop_all();
        tracing::info!("supervisor stopped");
        result.and(stopped)
    }

    fn service_loop(&mut self, shutdown: &AtomicBool) -> Result<()> {
        while sleep_unless_shutdown(self.clock, self.options.token_poll, shutdown) {
            self.reap()?;
            self.service_token()?;
        }
        Ok(())
    }
}

impl<P> Drop for Supervisor<'_, P> {
    fn drop(&mut self) {
        for proc in [self.bridge.take(), self.terminal.take()].into_iter().flatten() {
            let _ = proc.terminate(self.options.grace, self.clock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::Sandbox;
    use std::cell::Cell;
    use std::sync::atomic::Ordering;

    struct StubProbe {
        up: Cell<bool>,
    }

    impl Probe for StubProbe {
        fn process_running(&self, _: &str) -> bool {
            self.up.get()
        }
        fn port_listening(&self, _: u16) -> bool {
            self.up.get()
        }
        fn port_accepts(&self, _: u16, _: Duration) -> bool {
            self.up.get()
        }
    }

    fn options(sb: &Sandbox) -> SupervisorOptions {
        SupervisorOptions {
            sweep_strays: false,
            ..SupervisorOptions::from_settings(&sb.settings)
        }
    }

    fn sandbox() -> Sandbox {
        let sb = Sandbox::new(&[]);
        sb.stub_tool("wine", &format!("{}\nexec sleep 30", sb.log_line()));
        sb
    }

    /// Launch lines are written by the children, so give them a moment.
    fn wait_for_calls(sb: &Sandbox, n: usize) -> Vec<String> {
        for _ in 0..250 {
            let calls = sb.calls();
            if calls.len() >= n {
                return calls;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        sb.calls()
    }

    #[test]
    fn token_triggers_full_restart_and_is_consumed() {
        let sb = sandbox();
        let probe = StubProbe { up: Cell::new(true) };
        let mut sup = Supervisor::with_options(&sb.settings, &probe, &sb.clock, options(&sb));

        sup.start_all().unwrap();
        let first = (sup.terminal().unwrap().pid(), sup.bridge().unwrap().pid());
        assert_eq!(wait_for_calls(&sb, 2).len(), 2);

        let token = RestartToken::new(&sb.settings.restart_token);
        token.request("bridge: port 8001 not listening").unwrap();
        assert!(sup.service_token().unwrap());
        assert_eq!(token.peek().unwrap(), None);

        let second = (sup.terminal().unwrap().pid(), sup.bridge().unwrap().pid());
        assert_ne!(first.0, second.0);
        assert_ne!(first.1, second.1);

        let calls = wait_for_calls(&sb, 4);
        assert_eq!(calls.len(), 4);
        // Each child logs its own launch line, so only the counts are stable.
        let count = |needle: &str| calls.iter().filter(|c| c.contains(needle)).count();
        assert_eq!(count("terminal64.exe /portable"), 2, "{calls:?}");
        assert_eq!(count(r"C:\bridge\bridge.py --host 0.0.0.0 --port 8001"), 2, "{calls:?}");

        sup.stop_all().unwrap();
        assert!(sup.terminal().is_none() && sup.bridge().is_none());
    }

    #[test]
    fn no_token_means_no_restart() {
        let sb = sandbox();
        let probe = StubProbe { up: Cell::new(true) };
        let mut sup = Supervisor::with_options(&sb.settings, &probe, &sb.clock, options(&sb));
        assert!(!sup.service_token().unwrap());
        assert!(sup.terminal().is_none());
        assert!(sb.calls().is_empty());
    }

    #[test]
    fn slow_terminal_start_is_not_fatal() {
        let sb = sandbox();
        let probe = StubProbe { up: Cell::new(false) };
        let mut sup = Supervisor::with_options(&sb.settings, &probe, &sb.clock, options(&sb));

        sup.start_terminal().unwrap();
        assert!(sb.clock.elapsed() >= Duration::from_secs(90));
        assert!(sup.terminal().is_some());
        sup.stop_all().unwrap();
    }

    #[test]
    fn reap_drops_exited_children() {
        let sb = Sandbox::new(&[]);
        sb.stub_tool("wine", "exit 0");
        let probe = StubProbe { up: Cell::new(true) };
        let mut sup = Supervisor::with_options(&sb.settings, &probe, &sb.clock, options(&sb));
        sup.start_all().unwrap();

        for _ in 0..250 {
            sup.reap().unwrap();
            if sup.terminal().is_none() && sup.bridge().is_none() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(sup.terminal().is_none());
        assert!(sup.bridge().is_none());
    }

    #[test]
    fn run_returns_on_shutdown_before_startup() {
        let sb = sandbox();
        let probe = StubProbe { up: Cell::new(true) };
        let shutdown = AtomicBool::new(false);
        shutdown.store(true, Ordering::SeqCst);
        let mut sup = Supervisor::with_options(&sb.settings, &probe, &sb.clock, options(&sb));
        sup.run(&shutdown).unwrap();
        assert!(sb.calls().is_empty());
    }
}
