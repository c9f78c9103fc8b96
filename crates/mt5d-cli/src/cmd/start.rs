use crate::output::{print_json, print_reports};
use anyhow::Context;
use mt5d_core::{
    clock::SystemClock,
    config::Settings,
    fetch::Fetcher,
    orchestrator::Orchestrator,
    procs,
    steps::{default_steps, StepContext},
};
use std::process::Command;

pub fn run(json: bool) -> anyhow::Result<()> {
    let settings = super::load_settings()?;
    settings.log_summary();
    if let Err(e) = settings.require_tools() {
        tracing::error!("fatal: {e}");
        return Err(e.into());
    }

    let fetcher = Fetcher::from_settings(&settings).context("failed to build downloader")?;
    let clock = SystemClock;
    let ctx = StepContext {
        settings: &settings,
        fetcher: &fetcher,
        clock: &clock,
    };
    let report = Orchestrator::new(&ctx, default_steps())
        .run()
        .context("provisioning failed")?;

    spawn_monitor(&settings)?;

    if json {
        print_json(&report)?;
    } else {
        print_reports(&report.steps);
    }
    Ok(())
}

/// Start `mt5d monitor` in its own process group so it outlives this process.
fn spawn_monitor(settings: &Settings) -> anyhow::Result<()> {
    if !settings.health.auto_recovery {
        tracing::info!("auto recovery disabled, health monitor not started");
        return Ok(());
    }
    let exe = std::env::current_exe().context("cannot locate the mt5d binary")?;
    let mut cmd = Command::new(exe);
    cmd.arg("monitor");
    let pid = procs::spawn_detached(&mut cmd).context("failed to start health monitor")?;
    tracing::info!(pid, "health monitor started");
    Ok(())
}
