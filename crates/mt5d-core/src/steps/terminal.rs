use std::ffi::OsStr;
use std::process::Stdio;

use super::{download_dir, Step, StepContext};
use crate::error::Result;
use crate::installer::{self, InstallerWatch};
use crate::paths;
use crate::procs;
use crate::tool_runner;
use crate::types::{Criticality, StepId};

/// Silent-install switch of the MetaQuotes setup program.
const SETUP_SILENT_ARG: &str = "/auto";

pub struct InstallTerminal;

impl Step for InstallTerminal {
    fn id(&self) -> StepId {
        StepId::InstallTerminal
    }

    fn criticality(&self) -> Criticality {
        Criticality::Required
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::ConfigurePrefix]
    }

    fn already_done(&self, ctx: &StepContext) -> Result<bool> {
        Ok(ctx.settings.terminal_exe().is_file())
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        let settings = ctx.settings;
        let artifact = &settings.artifacts.mt5_setup;
        let scratch = download_dir()?;
        let setup = scratch.path().join(&artifact.name);
        ctx.fetcher.fetch_artifact(artifact, &setup)?;

        let mut cmd =
            tool_runner::wine(settings, [setup.as_os_str(), OsStr::new(SETUP_SILENT_ARG)]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        tracing::info!(timeout_secs = settings.installer_timeout_secs, "running terminal installer");
        let child = procs::spawn_in_group(&mut cmd)?;

        let exe = settings.terminal_exe();
        let outcome = InstallerWatch::new(&exe, settings.installer_timeout())
            .kill_strays(&[artifact.name.as_str(), paths::TERMINAL_EXE])
            .wait(child, ctx.clock)?;
        installer::verify_installed(&exe, outcome)?;
        tracing::info!(path = %exe.display(), "terminal installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Mt5dError;
    use crate::steps::testing::Sandbox;

    #[test]
    fn installs_via_staged_setup_and_stops_at_target() {
        let sb = Sandbox::new(&[]);
        sb.stage("mt5setup.exe", "MZ");
        let exe = sb.settings.terminal_exe();
        sb.stub_tool(
            "wine",
            &format!(
                "{}\nmkdir -p '{}'\ntouch '{}'\nexec sleep 30",
                sb.log_line(),
                exe.parent().unwrap().display(),
                exe.display()
            ),
        );

        assert!(!InstallTerminal.already_done(&sb.ctx()).unwrap());
        InstallTerminal.run(&sb.ctx()).unwrap();
        assert!(InstallTerminal.already_done(&sb.ctx()).unwrap());
        let calls = sb.calls();
        assert!(calls[0].contains("mt5setup.exe /auto"), "{calls:?}");
    }

    #[test]
    fn installer_that_installs_nothing_fails() {
        let sb = Sandbox::new(&[("INSTALLER_TIMEOUT", "20")]);
        sb.stage("mt5setup.exe", "MZ");
        sb.stub_tool("wine", "exit 0");

        let err = InstallTerminal.run(&sb.ctx()).unwrap_err();
        assert!(matches!(err, Mt5dError::Verification(_)), "{err}");
    }

    #[test]
    fn unavailable_setup_fails_before_wine_runs() {
        let sb = Sandbox::new(&[]);
        sb.stub_tool("wine", &sb.log_line());
        assert!(matches!(
            InstallTerminal.run(&sb.ctx()),
            Err(Mt5dError::Download { .. })
        ));
        assert!(sb.calls().is_empty());
    }
}
