//! Feature-flagged Wine components. A disabled flag makes the step report
//! done without touching the prefix.

use std::ffi::OsStr;

use super::{download_dir, Step, StepContext};
use crate::error::Result;
use crate::tool_runner;
use crate::types::{Criticality, StepId};

// ---------------------------------------------------------------------------
// install-runtimes
// ---------------------------------------------------------------------------

/// wine-mono (.NET) and wine-gecko (HTML rendering), installed from MSI.
pub struct InstallRuntimes;

impl Step for InstallRuntimes {
    fn id(&self) -> StepId {
        StepId::InstallRuntimes
    }

    fn criticality(&self) -> Criticality {
        Criticality::Recommended
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::InitPrefix]
    }

    fn already_done(&self, ctx: &StepContext) -> Result<bool> {
        if !ctx.settings.install_runtimes {
            tracing::info!("INSTALL_RUNTIMES disabled, skipping wine-mono and wine-gecko");
            return Ok(true);
        }
        Ok(false)
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        let scratch = download_dir()?;
        let artifacts = &ctx.settings.artifacts;
        for artifact in [&artifacts.wine_mono, &artifacts.wine_gecko] {
            let msi = scratch.path().join(&artifact.name);
            ctx.fetcher.fetch_artifact(artifact, &msi)?;
            ctx.run(&mut tool_runner::wine(
                ctx.settings,
                [OsStr::new("msiexec"), OsStr::new("/i"), msi.as_os_str(), OsStr::new("/qn")],
            ))?;
            tracing::info!(package = %artifact.name, "runtime installed");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// install-fonts
// ---------------------------------------------------------------------------

pub struct InstallFonts;

impl Step for InstallFonts {
    fn id(&self) -> StepId {
        StepId::InstallFonts
    }

    fn criticality(&self) -> Criticality {
        Criticality::Optional
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::InitPrefix]
    }

    fn already_done(&self, ctx: &StepContext) -> Result<bool> {
        Ok(!ctx.settings.install_fonts)
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        ctx.run(&mut tool_runner::winetricks(ctx.settings, ["corefonts"]))?;
        tracing::info!("core fonts installed");
        Ok(())
    }
}
