use mt5d_core::{clock::SystemClock, monitor::Monitor, probe::SystemProbe};

pub fn run() -> anyhow::Result<()> {
    let settings = super::load_settings()?;
    super::run_until_signal(move |shutdown| {
        let clock = SystemClock;
        let mut monitor = Monitor::new(&settings, SystemProbe, &clock);
        monitor.run(&shutdown)
    })
}
