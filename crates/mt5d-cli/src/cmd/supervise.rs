use mt5d_core::{clock::SystemClock, probe::SystemProbe, supervisor::Supervisor};

pub fn run() -> anyhow::Result<()> {
    let settings = super::load_settings()?;
    settings.log_summary();
    super::run_until_signal(move |shutdown| {
        let clock = SystemClock;
        let mut supervisor = Supervisor::new(&settings, SystemProbe, &clock);
        supervisor.run(&shutdown)
    })
}
