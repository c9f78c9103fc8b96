use crate::output::{print_json, Table};
use anyhow::Context;
use mt5d_core::{
    fetch::{FetchSource, Fetcher},
    io, paths,
};
use serde::Serialize;

#[derive(Serialize)]
struct Prefetched {
    artifact: String,
    source: &'static str,
}

/// Fill the image staging directory with every installer and write the
/// version manifest next to them.
pub fn run(json: bool) -> anyhow::Result<()> {
    let settings = super::load_settings()?;
    settings.log_summary();
    let fetcher = Fetcher::from_settings(&settings).context("failed to build downloader")?;
    io::ensure_dir(&settings.staging_dir)?;

    let mut results = Vec::new();
    for artifact in settings.artifacts.all() {
        let dest = settings.staging_dir.join(&artifact.name);
        let source = if dest.is_file() {
            tracing::info!(artifact = %artifact.name, "already staged");
            "staged"
        } else {
            let source = fetcher
                .fetch_artifact(artifact, &dest)
                .with_context(|| format!("failed to fetch {}", artifact.name))?;
            match source {
                FetchSource::Cache => "cache",
                FetchSource::Staging => "staged",
                FetchSource::Network => "network",
            }
        };
        results.push(Prefetched {
            artifact: artifact.name.clone(),
            source,
        });
    }

    let manifest = paths::versions_manifest(&settings.staging_dir);
    io::atomic_write(&manifest, settings.render_manifest().as_bytes())
        .context("failed to write version manifest")?;
    tracing::info!(path = %manifest.display(), "version manifest written");

    if json {
        return print_json(&results);
    }
    let mut table = Table::new(&["ARTIFACT", "SOURCE"]);
    for r in &results {
        table.push(vec![r.artifact.clone(), r.source.to_string()]);
    }
    table.print();
    Ok(())
}
