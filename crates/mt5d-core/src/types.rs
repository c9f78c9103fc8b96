use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// StepId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    UnpackTemplate,
    InitPrefix,
    ConfigurePrefix,
    InstallRuntimes,
    InstallFonts,
    InstallTerminal,
    GenerateLoginConfig,
    InstallPython,
    InstallBridgePackages,
    DeployBridge,
    InstallCompanionPackages,
}

impl StepId {
    pub fn all() -> &'static [StepId] {
        &[
            StepId::UnpackTemplate,
            StepId::InitPrefix,
            StepId::ConfigurePrefix,
            StepId::InstallRuntimes,
            StepId::InstallFonts,
            StepId::InstallTerminal,
            StepId::GenerateLoginConfig,
            StepId::InstallPython,
            StepId::InstallBridgePackages,
            StepId::DeployBridge,
            StepId::InstallCompanionPackages,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepId::UnpackTemplate => "unpack-template",
            StepId::InitPrefix => "init-prefix",
            StepId::ConfigurePrefix => "configure-prefix",
            StepId::InstallRuntimes => "install-runtimes",
            StepId::InstallFonts => "install-fonts",
            StepId::InstallTerminal => "install-terminal",
            StepId::GenerateLoginConfig => "generate-login-config",
            StepId::InstallPython => "install-python",
            StepId::InstallBridgePackages => "install-bridge-packages",
            StepId::DeployBridge => "deploy-bridge",
            StepId::InstallCompanionPackages => "install-companion-packages",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepId {
    type Err = crate::error::Mt5dError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepId::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| crate::error::Mt5dError::UnknownStep(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Criticality
// ---------------------------------------------------------------------------

/// How a step failure affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure aborts orchestration.
    Required,
    /// Failure is a warning; orchestration continues.
    Recommended,
    /// Failure is logged at debug level only.
    Optional,
}

impl Criticality {
    pub fn as_str(self) -> &'static str {
        match self {
            Criticality::Required => "required",
            Criticality::Recommended => "recommended",
            Criticality::Optional => "optional",
        }
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// A monitored component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Terminal,
    Bridge,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::Terminal => "terminal",
            Target::Bridge => "bridge",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
