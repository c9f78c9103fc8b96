use crate::output::{print_json, print_reports};
use anyhow::Context;
use mt5d_core::{
    clock::SystemClock,
    fetch::Fetcher,
    orchestrator::Orchestrator,
    steps::{default_steps, StepContext},
    types::StepId,
};

pub fn run(id: StepId, json: bool) -> anyhow::Result<()> {
    let settings = super::load_settings()?;
    let fetcher = Fetcher::from_settings(&settings).context("failed to build downloader")?;
    let clock = SystemClock;
    let ctx = StepContext {
        settings: &settings,
        fetcher: &fetcher,
        clock: &clock,
    };
    let report = Orchestrator::new(&ctx, default_steps())
        .run_single(id)
        .with_context(|| format!("step '{id}' failed"))?;

    if json {
        print_json(&report)?;
    } else {
        print_reports(std::slice::from_ref(&report));
    }
    Ok(())
}
