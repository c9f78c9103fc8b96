use std::ffi::OsStr;

use super::{download_dir, Step, StepContext};
use crate::config::Settings;
use crate::error::{Mt5dError, Result};
use crate::tool_runner;
use crate::types::{Criticality, StepId};

const PYTHON_TARGET_DIR: &str = r"C:\Python";

// ---------------------------------------------------------------------------
// install-python
// ---------------------------------------------------------------------------

/// The Windows CPython that runs the bridge inside the prefix.
pub struct InstallPython;

impl InstallPython {
    fn version(ctx: &StepContext) -> Result<String> {
        ctx.stdout(&mut tool_runner::windows_python(ctx.settings, ["--version"]))
    }
}

impl Step for InstallPython {
    fn id(&self) -> StepId {
        StepId::InstallPython
    }

    fn criticality(&self) -> Criticality {
        Criticality::Required
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::InitPrefix]
    }

    fn already_done(&self, ctx: &StepContext) -> Result<bool> {
        if !ctx.settings.python_exe().is_file() {
            return Ok(false);
        }
        Ok(Self::version(ctx).is_ok())
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        let settings = ctx.settings;
        let artifact = &settings.artifacts.python_installer;
        let scratch = download_dir()?;
        let installer = scratch.path().join(&artifact.name);
        ctx.fetcher.fetch_artifact(artifact, &installer)?;

        let target = format!("TargetDir={PYTHON_TARGET_DIR}");
        let args = [
            installer.as_os_str(),
            OsStr::new("/quiet"),
            OsStr::new("InstallAllUsers=1"),
            OsStr::new("PrependPath=1"),
            OsStr::new("Include_test=0"),
            OsStr::new(&target),
        ];
        // python.exe appears before the MSI finishes; wait for the installer to exit.
        tool_runner::run_checked(
            &mut tool_runner::wine(settings, args),
            settings.installer_timeout(),
            ctx.clock,
        )?;

        let version = Self::version(ctx)
            .map_err(|e| Mt5dError::Verification(format!("python.exe does not run: {e}")))?;
        tracing::info!(%version, "windows python installed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// install-bridge-packages
// ---------------------------------------------------------------------------

/// Module the bridge needs besides the terminal API: it serves gRPC.
const BRIDGE_IMPORT_CHECK: &str = "import MetaTrader5, grpc";

/// Pinned requirements for the Windows Python: the terminal API, the gRPC
/// runtime the bridge serves on, the RPyC stack for legacy clients, then any
/// `BRIDGE_EXTRA_PACKAGES`.
pub fn bridge_requirements(settings: &Settings) -> Vec<String> {
    let v = &settings.versions;
    let mut reqs = vec![
        format!("MetaTrader5=={}", v.metatrader5),
        format!("grpcio=={}", v.grpcio),
        format!("protobuf=={}", v.protobuf),
        format!("numpy=={}", v.numpy),
        format!("rpyc=={}", v.rpyc),
        format!("plumbum=={}", v.plumbum),
    ];
    reqs.extend(settings.bridge_extra_packages.iter().cloned());
    reqs
}

pub struct InstallBridgePackages;

impl Step for InstallBridgePackages {
    fn id(&self) -> StepId {
        StepId::InstallBridgePackages
    }

    fn criticality(&self) -> Criticality {
        Criticality::Required
    }

    fn depends_on(&self) -> &'static [StepId] {
        &[StepId::InstallPython]
    }

    fn already_done(&self, _ctx: &StepContext) -> Result<bool> {
        Ok(false)
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        let v = &ctx.settings.versions;
        let pins = bridge_requirements(ctx.settings);
        let mut install = tool_runner::windows_python(
            ctx.settings,
            ["-m", "pip", "install", "--no-cache-dir", "--upgrade"],
        );
        install.args(&pins);
        ctx.run(&mut install)?;

        ctx.run(&mut tool_runner::windows_python(
            ctx.settings,
            ["-c", BRIDGE_IMPORT_CHECK],
        ))
        .map_err(|e| Mt5dError::Verification(format!("bridge packages not importable: {e}")))?;
        tracing::info!(metatrader5 = %v.metatrader5, grpcio = %v.grpcio, "bridge packages installed");
        Ok(())
    }
}
