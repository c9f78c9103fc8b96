//! Dependency-ordered, fail-fast runner for the provisioning steps.
//!
//! A run clears the startup-complete signal first and writes it only after
//! every step is done, so the signal never outlives a failed or in-progress
//! provisioning.

mod plan;

pub use plan::plan;

use serde::Serialize;

use crate::error::{Mt5dError, Result};
use crate::signals::StartupMarker;
use crate::state::StepState;
use crate::steps::{Step, StepContext};
use crate::types::{Criticality, StepId};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Marker present or effect already in place.
    Skipped,
    Completed,
    /// Failed, but the step's criticality let the run continue.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: StepId,
    pub criticality: Criticality,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Completed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Failed { .. }))
    }

    fn count(&self, f: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|r| f(&r.outcome)).count()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a> {
    ctx: &'a StepContext<'a>,
    steps: Vec<Box<dyn Step + 'a>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a StepContext<'a>, steps: Vec<Box<dyn Step + 'a>>) -> Self {
        Self { ctx, steps }
    }

    /// The steps in execution order.
    pub fn planned(&self) -> Result<Vec<&dyn Step>> {
        plan(&self.steps)
    }

    /// Whether `step` would be skipped right now.
    pub fn is_done(&self, step: &dyn Step, state: &StepState) -> bool {
        if step.records_marker() && state.is_done(step.id()) {
            return true;
        }
        match step.already_done(self.ctx) {
            Ok(done) => done,
            Err(e) => {
                tracing::debug!(step = %step.id(), error = %e, "completion check failed, treating as pending");
                false
            }
        }
    }

    /// Provision everything. Returns `StepFailed` at the first Required
    /// failure, without running the remaining steps.
    pub fn run(&self) -> Result<RunReport> {
        let marker = StartupMarker::new(&self.ctx.settings.startup_marker);
        if marker.clear()? {
            tracing::info!(path = %marker.path().display(), "cleared stale startup marker");
        }

        let planned = self.planned()?;
        let state_path = self.ctx.settings.state_file();
        let mut state = StepState::load(&state_path)?;
        let mut report = RunReport::default();

        for step in planned {
            let outcome = self.execute(step, &mut state)?;
            report.steps.push(StepReport {
                step: step.id(),
                criticality: step.criticality(),
                outcome,
            });
        }

        marker.set()?;
        tracing::info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "startup complete"
        );
        Ok(report)
    }

    /// Run one step by id with the same skip and marker rules as `run`.
    /// The startup signal is left alone.
    pub fn run_single(&self, id: StepId) -> Result<StepReport> {
        let step = self
            .steps
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| Mt5dError::UnknownStep(id.to_string()))?;
        let mut state = StepState::load(&self.ctx.settings.state_file())?;
        let outcome = self.execute(step.as_ref(), &mut state)?;
        Ok(StepReport {
            step: id,
            criticality: step.criticality(),
            outcome,
        })
    }

    fn execute(&self, step: &dyn Step, state: &mut StepState) -> Result<StepOutcome> {
        let id = step.id();
        if self.is_done(step, state) {
            tracing::info!(step = %id, "already complete, skipping");
            return Ok(StepOutcome::Skipped);
        }

        tracing::info!(step = %id, criticality = %step.criticality(), "running");
        match step.run(self.ctx) {
            Ok(()) => {
                if step.records_marker() {
                    state.mark_done(id);
                    state.save(&self.ctx.settings.state_file())?;
                }
                tracing::info!(step = %id, "done");
                Ok(StepOutcome::Completed)
            }
            Err(e) => {
                let reason = e.to_string();
                match step.criticality() {
                    Criticality::Required => {
                        tracing::error!(step = %id, error = %reason, "required step failed, aborting");
                        return Err(Mt5dError::StepFailed {
                            step: id.to_string(),
                            reason,
                        });
                    }
                    Criticality::Recommended => {
                        tracing::warn!(step = %id, error = %reason, "recommended step failed, continuing");
                    }
                    Criticality::Optional => {
                        tracing::debug!(step = %id, error = %reason, "optional step failed, continuing");
                    }
                }
                Ok(StepOutcome::Failed { reason })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
