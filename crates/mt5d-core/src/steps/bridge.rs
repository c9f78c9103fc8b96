use std::path::{Path, PathBuf};

use super::{Step, StepContext};
use crate::error::{Mt5dError, Result};
use crate::io;
use crate::paths;
use crate::types::{Criticality, StepId};

/// Copies the bridge's Python sources into the prefix where the Windows
/// interpreter can run them. Re-checked by content on every start so an
/// updated image ships its new bridge.
pub struct DeployBridge;

fn python_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "py") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

impl Step for DeployBridge {
    fn id(&self) -> StepId {
        StepId::DeployBridge
    }

    fn criticality(&self) -> Criticality {
        Criticality::Required
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::InstallPython]
    }

    fn records_marker(&self) -> bool {
        false
    }

    fn already_done(&self, ctx: &StepContext) -> Result<bool> {
        let source = &ctx.settings.bridge_source_dir;
        if !source.is_dir() {
            return Ok(false);
        }
        let files = python_sources(source)?;
        if files.is_empty() {
            return Ok(false);
        }
        let dest = ctx.settings.bridge_dir();
        for file in &files {
            let Some(name) = file.file_name() else { continue };
            if !io::same_contents(file, &dest.join(name))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        let source = &ctx.settings.bridge_source_dir;
        if !source.is_dir() {
            return Err(Mt5dError::Verification(format!(
                "bridge source directory {} does not exist",
                source.display()
            )));
        }
        let dest = ctx.settings.bridge_dir();
        io::ensure_dir(&dest)?;
        let files = python_sources(source)?;
        for file in &files {
            let Some(name) = file.file_name() else { continue };
            io::copy_atomic(file, &dest.join(name))?;
        }

        let script = paths::bridge_script(&ctx.settings.wine_prefix);
        if !script.is_file() {
            return Err(Mt5dError::Verification(format!(
                "{} missing after deploy",
                script.display()
            )));
        }
        tracing::info!(files = files.len(), dest = %dest.display(), "bridge deployed");
        Ok(())
    }
}
