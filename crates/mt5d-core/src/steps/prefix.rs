use super::{Step, StepContext};
use crate::error::{Mt5dError, Result};
use crate::paths;
use crate::tool_runner;
use crate::types::{Criticality, StepId};

const WINDOWS_VERSION: &str = "win10";

// ---------------------------------------------------------------------------
// init-prefix
// ---------------------------------------------------------------------------

pub struct InitPrefix;

impl Step for InitPrefix {
    fn id(&self) -> StepId {
        StepId::InitPrefix
    }

    fn criticality(&self) -> Criticality {
        Criticality::Required
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::UnpackTemplate]
    }

    fn already_done(&self, ctx: &StepContext) -> Result<bool> {
        let prefix = &ctx.settings.wine_prefix;
        Ok(paths::drive_c(prefix).is_dir() && prefix.join(paths::SYSTEM_REG).is_file())
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        crate::io::ensure_dir(&ctx.settings.wine_prefix)?;
        ctx.run(&mut tool_runner::wine(ctx.settings, ["wineboot", "--init"]))?;
        if !paths::drive_c(&ctx.settings.wine_prefix).is_dir() {
            return Err(Mt5dError::Verification(
                "wineboot finished but drive_c is missing".into(),
            ));
        }
        tracing::info!(prefix = %ctx.settings.wine_prefix.display(), "wine prefix initialized");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// configure-prefix
// ---------------------------------------------------------------------------

/// Report Windows 10 to programs in the prefix; the terminal refuses older
/// versions.
pub struct ConfigurePrefix;

impl Step for ConfigurePrefix {
    fn id(&self) -> StepId {
        StepId::ConfigurePrefix
    }

    fn criticality(&self) -> Criticality {
        Criticality::Recommended
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::InitPrefix]
    }

    fn already_done(&self, _ctx: &StepContext) -> Result<bool> {
        Ok(false)
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        ctx.run(&mut tool_runner::wine(
            ctx.settings,
            [
                "reg",
                "add",
                r"HKCU\Software\Wine",
                "/v",
                "Version",
                "/d",
                WINDOWS_VERSION,
                "/f",
            ],
        ))?;
        tracing::info!(version = WINDOWS_VERSION, "windows version set");
        Ok(())
    }
}
