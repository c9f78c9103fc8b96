use anyhow::{bail, Context};
use mt5d_core::{signals::StartupMarker, state::StepState, types::StepId};

/// Remove one marker, or every marker plus the startup signal.
pub fn run(step: Option<StepId>, all: bool) -> anyhow::Result<()> {
    let settings = super::load_settings()?;
    let path = settings.state_file();
    let mut state = StepState::load(&path).context("failed to load step state")?;

    match (step, all) {
        (Some(id), false) => {
            if state.clear(id) {
                state.save(&path)?;
                println!("Cleared marker for '{id}'.");
            } else {
                println!("No marker recorded for '{id}'.");
            }
        }
        (None, true) => {
            let n = state.clear_all();
            state.save(&path)?;
            let marker = StartupMarker::new(&settings.startup_marker);
            marker.clear().context("failed to remove startup marker")?;
            println!("Cleared {n} marker(s) and the startup signal.");
        }
        _ => bail!("specify a step id or --all"),
    }
    Ok(())
}
