use super::{Step, StepContext};
use crate::error::{Mt5dError, Result};
use crate::tool_runner;
use crate::types::{Criticality, StepId};

/// The Linux-side client stack so tools in the container can talk to the
/// bridge: `mt5linux` (from `MT5LINUX_SPEC`) with pinned gRPC, protobuf,
/// numpy and the RPyC pair it builds on.
pub struct InstallCompanionPackages;

impl Step for InstallCompanionPackages {
    fn id(&self) -> StepId {
        StepId::InstallCompanionPackages
    }

    fn criticality(&self) -> Criticality {
        Criticality::Recommended
    }

    fn already_done(&self, _ctx: &StepContext) -> Result<bool> {
        Ok(false)
    }

    fn run(&self, ctx: &StepContext) -> Result<()> {
        let v = &ctx.settings.versions;
        let mut install = tool_runner::linux_python(
            ctx.settings,
            ["-m", "pip", "install", "--no-cache-dir"],
        );
        install.args([
            ctx.settings.mt5linux_spec.clone(),
            format!("grpcio=={}", v.grpcio),
            format!("protobuf=={}", v.protobuf),
            format!("numpy=={}", v.numpy),
            format!("rpyc=={}", v.rpyc),
            format!("plumbum=={}", v.plumbum),
        ]);
        ctx.run(&mut install)?;

        ctx.run(&mut tool_runner::linux_python(
            ctx.settings,
            ["-c", "import mt5linux, grpc, numpy"],
        ))
        .map_err(|e| Mt5dError::Verification(format!("companion packages not importable: {e}")))?;
        tracing::info!("linux companion packages installed");
        Ok(())
    }
}
