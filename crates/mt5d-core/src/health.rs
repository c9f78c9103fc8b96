//! Per-target restart policy.
//!
//! `TargetHealth` is a pure state machine: it is fed one observation per
//! monitor tick along with the current instant and answers with a verdict.
//! Nothing here touches processes or the filesystem.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::HealthSettings;
use crate::types::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorPolicy {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub max_restarts: u32,
    pub stable_period: Duration,
}

impl From<&HealthSettings> for MonitorPolicy {
    fn from(h: &HealthSettings) -> Self {
        Self {
            failure_threshold: h.failure_threshold.max(1),
            cooldown: h.restart_cooldown(),
            max_restarts: h.max_restart_attempts,
            stable_period: h.stable_period(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Healthy,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Healthy,
    Degraded { failures: u32 },
    RestartRequested { attempt: u32, reason: String },
    CooldownActive { remaining_secs: u64 },
    Exhausted { restarts: u32 },
}

#[derive(Debug, Clone)]
pub struct TargetHealth {
    target: Target,
    policy: MonitorPolicy,
    failures: u32,
    restarts: u32,
    last_restart: Option<Instant>,
    healthy_since: Option<Instant>,
}

impl TargetHealth {
    pub fn new(target: Target, policy: MonitorPolicy) -> Self {
        Self {
            target,
            policy,
            failures: 0,
            restarts: 0,
            last_restart: None,
            healthy_since: None,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn observe(&mut self, now: Instant, observation: Observation) -> Verdict {
        match observation {
            Observation::Healthy => self.on_healthy(now),
            Observation::Failed(reason) => self.on_failure(now, reason),
        }
    }

    fn on_healthy(&mut self, now: Instant) -> Verdict {
        self.failures = 0;
        let since = *self.healthy_since.get_or_insert(now);
        if self.restarts > 0 && now.duration_since(since) >= self.policy.stable_period {
            tracing::info!(
                target = %self.target,
                restarts = self.restarts,
                "stable period reached, restart counter reset"
            );
            self.restarts = 0;
        }
        Verdict::Healthy
    }

    // Failures are not reset by a restart request: a target that stays down
    // keeps qualifying, and only the cooldown spaces the requests out.
    fn on_failure(&mut self, now: Instant, reason: String) -> Verdict {
        self.healthy_since = None;
        self.failures = self.failures.saturating_add(1);

        if self.failures < self.policy.failure_threshold {
            return Verdict::Degraded {
                failures: self.failures,
            };
        }
        if self.restarts >= self.policy.max_restarts {
            return Verdict::Exhausted {
                restarts: self.restarts,
            };
        }
        if let Some(last) = self.last_restart {
            let since = now.duration_since(last);
            if since < self.policy.cooldown {
                let remaining = self.policy.cooldown - since;
                return Verdict::CooldownActive {
                    remaining_secs: remaining.as_secs_f64().ceil() as u64,
                };
            }
        }

        self.restarts += 1;
        self.last_restart = Some(now);
        Verdict::RestartRequested {
            attempt: self.restarts,
            reason,
        }
    }
}
