//! Polling driver that feeds probe results into the per-target state
//! machines and turns restart verdicts into restart tokens.
//!
//! The monitor never kills or launches anything itself: the supervisor owns
//! the processes and acts on the token.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::clock::{sleep_unless_shutdown, Clock};
use crate::config::Settings;
use crate::error::Result;
use crate::health::{MonitorPolicy, Observation, TargetHealth, Verdict};
use crate::paths;
use crate::probe::Probe;
use crate::signals::{RestartToken, StartupMarker};
use crate::types::Target;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// How often to look for the startup marker before the first check.
const STARTUP_POLL: Duration = Duration::from_secs(5);

/// Verdicts from one tick. `bridge` is `None` when the terminal check failed
/// and the bridge was not evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub terminal: Verdict,
    pub bridge: Option<Verdict>,
}

pub struct Monitor<'a, P> {
    probe: P,
    clock: &'a dyn Clock,
    interval: Duration,
    bridge_port: u16,
    marker: StartupMarker,
    token: RestartToken,
    terminal: TargetHealth,
    bridge: TargetHealth,
}

impl<'a, P: Probe> Monitor<'a, P> {
    pub fn new(settings: &Settings, probe: P, clock: &'a dyn Clock) -> Self {
        let policy = MonitorPolicy::from(&settings.health);
        Self {
            probe,
            clock,
            interval: settings.health.check_interval(),
            bridge_port: settings.bridge_port,
            marker: StartupMarker::new(&settings.startup_marker),
            token: RestartToken::new(&settings.restart_token),
            terminal: TargetHealth::new(Target::Terminal, policy),
            bridge: TargetHealth::new(Target::Bridge, policy),
        }
    }

    /// Block until the startup marker exists. Returns `false` on shutdown.
    pub fn wait_for_startup(&self, shutdown: &AtomicBool) -> bool {
        let mut announced = false;
        while !self.marker.is_set() {
            if !announced {
                tracing::info!(path = %self.marker.path().display(), "waiting for startup to complete");
                announced = true;
            }
            if !sleep_unless_shutdown(self.clock, STARTUP_POLL, shutdown) {
                return false;
            }
        }
        true
    }

    /// One round of checks: terminal process, then bridge port, then a bridge
    /// connect. Each later check runs only when the earlier ones passed.
    pub fn tick(&mut self) -> Result<Tick> {
        let now = self.clock.now();

        if !self.probe.process_running(paths::TERMINAL_EXE) {
            let verdict = self
                .terminal
                .observe(now, Observation::Failed("terminal process not running".into()));
            self.act(Target::Terminal, &verdict)?;
            return Ok(Tick {
                terminal: verdict,
                bridge: None,
            });
        }
        let terminal = self.terminal.observe(now, Observation::Healthy);

        let port = self.bridge_port;
        let observation = if !self.probe.port_listening(port) {
            Observation::Failed(format!("port {port} not listening"))
        } else if !self.probe.port_accepts(port, CONNECT_TIMEOUT) {
            Observation::Failed(format!("port {port} not accepting connections"))
        } else {
            Observation::Healthy
        };
        let bridge = self.bridge.observe(now, observation);
        self.act(Target::Bridge, &bridge)?;

        Ok(Tick {
            terminal,
            bridge: Some(bridge),
        })
    }

    fn act(&self, target: Target, verdict: &Verdict) -> Result<()> {
        match verdict {
            Verdict::Healthy => {}
            Verdict::Degraded { failures } => {
                tracing::warn!(%target, failures, "health check failed");
            }
            Verdict::CooldownActive { remaining_secs } => {
                tracing::warn!(%target, remaining_secs, "restart cooldown active, skipping");
            }
            Verdict::Exhausted { restarts } => {
                tracing::error!(
                    %target,
                    restarts,
                    "restart attempts exhausted, manual intervention required"
                );
            }
            Verdict::RestartRequested { attempt, reason } => {
                tracing::warn!(%target, attempt, %reason, "requesting restart");
                self.token.request(&format!("{target}: {reason}"))?;
            }
        }
        Ok(())
    }

    /// Wait for startup, then check every interval until `shutdown` is raised.
    /// A failed round is logged and the loop carries on.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        if !self.wait_for_startup(shutdown) {
            return Ok(());
        }
        tracing::info!(interval_secs = self.interval.as_secs(), "health monitor started");
        loop {
            if let Err(e) = self.tick() {
                tracing::error!(error = %e, "health check round failed");
            }
            if !sleep_unless_shutdown(self.clock, self.interval, shutdown) {
                break;
            }
        }
        tracing::info!("health monitor stopped");
        Ok(())
    }
}
