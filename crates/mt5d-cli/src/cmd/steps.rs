use crate::output::{print_json, Table};
use anyhow::Context;
use mt5d_core::{
    clock::SystemClock,
    fetch::Fetcher,
    orchestrator::Orchestrator,
    state::StepState,
    steps::{default_steps, StepContext},
    types::{Criticality, StepId},
};
use serde::Serialize;

#[derive(Serialize)]
struct PlannedStep {
    step: StepId,
    criticality: Criticality,
    depends_on: Vec<StepId>,
    done: bool,
}

pub fn run(json: bool) -> anyhow::Result<()> {
    let settings = super::load_settings()?;
    let fetcher = Fetcher::from_settings(&settings).context("failed to build downloader")?;
    let clock = SystemClock;
    let ctx = StepContext {
        settings: &settings,
        fetcher: &fetcher,
        clock: &clock,
    };
    let orchestrator = Orchestrator::new(&ctx, default_steps());
    let state = StepState::load(&settings.state_file()).context("failed to load step state")?;

    let planned: Vec<PlannedStep> = orchestrator
        .planned()?
        .into_iter()
        .map(|s| PlannedStep {
            step: s.id(),
            criticality: s.criticality(),
            depends_on: s.depends_on().to_vec(),
            done: orchestrator.is_done(s, &state),
        })
        .collect();

    if json {
        return print_json(&planned);
    }

    let mut table = Table::new(&["STEP", "CRITICALITY", "DEPENDS ON", "STATUS"]);
    for p in &planned {
        let deps: Vec<&str> = p.depends_on.iter().map(|d| d.as_str()).collect();
        table.push(vec![
            p.step.to_string(),
            p.criticality.to_string(),
            if deps.is_empty() { "-".to_string() } else { deps.join(", ") },
            if p.done { "done" } else { "pending" }.to_string(),
        ]);
    }
    table.print();
    Ok(())
}
