pub mod config;
pub mod monitor;
pub mod prefetch;
pub mod reset;
pub mod start;
pub mod status;
pub mod step;
pub mod steps;
pub mod supervise;

use anyhow::Result;
use mt5d_core::config::Settings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

/// Resolve settings, logging a loader defect as fatal.
pub fn load_settings() -> Result<Settings> {
    match Settings::load() {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::error!("fatal: {e}");
            Err(anyhow::Error::new(e).context("failed to load settings"))
        }
    }
}

/// Run a blocking loop on the tokio blocking pool until it returns or the
/// process receives Ctrl-C / SIGTERM. On a signal the loop's shutdown flag is
/// raised and its own exit is awaited, so it can stop its children first.
pub fn run_until_signal<F>(work: F) -> Result<()>
where
    F: FnOnce(Arc<AtomicBool>) -> mt5d_core::Result<()> + Send + 'static,
{
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let mut worker = tokio::task::spawn_blocking(move || work(flag));
        let mut terminate = signal(SignalKind::terminate())?;

        tokio::select! {
            res = &mut worker => {
                res??;
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received, shutting down"),
            _ = terminate.recv() => tracing::info!("SIGTERM received, shutting down"),
        }

        shutdown.store(true, Ordering::SeqCst);
        worker.await??;
        Ok(())
    })
}
