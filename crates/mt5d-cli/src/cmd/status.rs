use crate::output::{print_json, Table};
use anyhow::Context;
use chrono::{DateTime, Utc};
use mt5d_core::{
    signals::{RestartToken, StartupMarker},
    state::StepState,
    types::StepId,
};
use serde::Serialize;

#[derive(Serialize)]
struct Marker {
    step: StepId,
    completed_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct StatusOutput {
    startup_complete: bool,
    restart_pending: Option<String>,
    markers: Vec<Marker>,
}

pub fn run(json: bool) -> anyhow::Result<()> {
    let settings = super::load_settings()?;
    let state = StepState::load(&settings.state_file()).context("failed to load step state")?;
    let restart_pending = RestartToken::new(&settings.restart_token)
        .peek()
        .context("failed to read restart token")?;

    let status = StatusOutput {
        startup_complete: StartupMarker::new(&settings.startup_marker).is_set(),
        restart_pending,
        markers: state
            .steps
            .iter()
            .map(|(step, record)| Marker {
                step: *step,
                completed_at: record.completed_at,
            })
            .collect(),
    };

    if json {
        return print_json(&status);
    }

    println!(
        "startup:  {}",
        if status.startup_complete { "complete" } else { "not complete" }
    );
    println!(
        "restart:  {}",
        status.restart_pending.as_deref().unwrap_or("none pending")
    );
    println!();
    if status.markers.is_empty() {
        println!("No steps recorded.");
        return Ok(());
    }
    let mut table = Table::new(&["STEP", "COMPLETED"]);
    for m in &status.markers {
        table.push(vec![
            m.step.to_string(),
            m.completed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]);
    }
    table.print();
    Ok(())
}
