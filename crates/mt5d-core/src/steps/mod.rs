//! The provisioning steps that bring a Wine prefix to a runnable terminal and
//! bridge.
//!
//! Each step answers two questions: is its effect already present
//! (`already_done`), and how to produce it (`run`, which must verify its own
//! result before returning `Ok`). Ordering, markers and failure policy live in
//! the orchestrator.

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::tool_runner;
use crate::types::{Criticality, StepId};
use std::process::{Command, Output};

mod bridge;
mod companion;
mod components;
mod login;
mod prefix;
mod python;
mod template;
mod terminal;

pub use bridge::DeployBridge;
pub use companion::InstallCompanionPackages;
pub use components::{InstallFonts, InstallRuntimes};
pub use login::{configured_login, render_login_config, GenerateLoginConfig};
pub use prefix::{ConfigurePrefix, InitPrefix};
pub use python::{InstallBridgePackages, InstallPython};
pub use template::UnpackTemplate;
pub use terminal::InstallTerminal;

// ---------------------------------------------------------------------------
// Step contract
// ---------------------------------------------------------------------------

/// Everything a step may touch.
pub struct StepContext<'a> {
    pub settings: &'a Settings,
    pub fetcher: &'a Fetcher,
    pub clock: &'a dyn Clock,
}

impl StepContext<'_> {
    /// Run a tool under `COMMAND_TIMEOUT`.
    pub fn run(&self, cmd: &mut Command) -> Result<Output> {
        tool_runner::run_checked(cmd, self.settings.command_timeout(), self.clock)
    }

    pub fn stdout(&self, cmd: &mut Command) -> Result<String> {
        tool_runner::run_stdout(cmd, self.settings.command_timeout(), self.clock)
    }
}

pub trait Step {
    fn id(&self) -> StepId;

    fn criticality(&self) -> Criticality;

    fn depends_on(&self) -> &'static [StepId] {
        &[]
    }

    /// Whether completion is recorded in the state file. Steps whose effect
    /// follows changeable inputs return `false` and are re-checked every run.
    fn records_marker(&self) -> bool {
        true
    }

    /// Direct check of the step's effect, independent of the marker store.
    fn already_done(&self, ctx: &StepContext) -> Result<bool>;

    /// Perform and verify the step.
    fn run(&self, ctx: &StepContext) -> Result<()>;
}

/// The full provisioning set, in declaration order.
pub fn default_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(UnpackTemplate),
        Box::new(InitPrefix),
        Box::new(ConfigurePrefix),
        Box::new(InstallRuntimes),
        Box::new(InstallFonts),
        Box::new(InstallTerminal),
        Box::new(GenerateLoginConfig),
        Box::new(InstallPython),
        Box::new(InstallBridgePackages),
        Box::new(DeployBridge),
        Box::new(InstallCompanionPackages),
    ]
}

/// Scratch directory for downloaded installers; removed on drop.
pub(crate) fn download_dir() -> Result<tempfile::TempDir> {
    Ok(tempfile::Builder::new().prefix("mt5d-download-").tempdir()?)
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fetch::{CachedFetcher, Download};
    use std::collections::HashMap;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A throwaway prefix, staging dir and signal files under one tempdir.
    pub struct Sandbox {
        pub root: TempDir,
        pub settings: Settings,
        pub fetcher: Fetcher,
        pub clock: ManualClock,
    }

    struct NoNetwork;

    impl Download for NoNetwork {
        fn download(&self, url: &str, _dest: &Path) -> Result<()> {
            Err(crate::error::Mt5dError::Download {
                url: url.to_string(),
                reason: "network disabled in tests".into(),
            })
        }
    }

    impl Sandbox {
        pub fn new(extra: &[(&str, &str)]) -> Self {
            let root = TempDir::new().unwrap();
            let p = |rel: &str| root.path().join(rel).display().to_string();
            let mut map: HashMap<String, String> = [
                ("WINEPREFIX", p("prefix")),
                ("MT5_STAGING_DIR", p("staging")),
                ("MT5_CACHE_DIR", p("cache")),
                ("MT5_BRIDGE_SOURCE", p("bridge-src")),
                ("STARTUP_MARKER", p("startup-complete")),
                ("RESTART_TOKEN", p("restart-requested")),
                ("WINE_BIN", p("bin/wine")),
                ("WINETRICKS_BIN", p("bin/winetricks")),
                ("LINUX_PYTHON", p("bin/python3")),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
            for (k, v) in extra {
                map.insert(k.to_string(), v.to_string());
            }
            let settings = Settings::from_map(&map).unwrap();
            std::fs::create_dir_all(&settings.staging_dir).unwrap();
            std::fs::create_dir_all(root.path().join("bin")).unwrap();
            let downloader: Box<dyn Download> = Box::new(NoNetwork);
            let fetcher = CachedFetcher::new(None, &settings.staging_dir, downloader);
            Self {
                root,
                settings,
                fetcher,
                clock: ManualClock::paced(std::time::Duration::from_millis(10)),
            }
        }

        pub fn ctx(&self) -> StepContext<'_> {
            StepContext {
                settings: &self.settings,
                fetcher: &self.fetcher,
                clock: &self.clock,
            }
        }

        pub fn prefix(&self) -> &Path {
            &self.settings.wine_prefix
        }

        /// Install an executable shell script as one of the sandbox tools.
        pub fn stub_tool(&self, name: &str, body: &str) -> PathBuf {
            let path = self.root.path().join("bin").join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        /// Where stub tools append their argv, one invocation per line.
        pub fn call_log(&self) -> PathBuf {
            self.root.path().join("calls.log")
        }

        pub fn calls(&self) -> Vec<String> {
            std::fs::read_to_string(self.call_log())
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        /// Shell snippet that records the invocation to `call_log`.
        pub fn log_line(&self) -> String {
            format!("printf '%s\\n' \"$0 $*\" >> '{}'", self.call_log().display())
        }

        pub fn stage(&self, name: &str, contents: &str) {
            std::fs::write(self.settings.staging_dir.join(name), contents).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_steps_cover_every_id_once() {
        let steps = default_steps();
        let ids: Vec<StepId> = steps.iter().map(|s| s.id()).collect();
        assert_eq!(ids, StepId::all().to_vec());
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn required_steps_match_the_table() {
        let required: Vec<StepId> = default_steps()
            .iter()
            .filter(|s| s.criticality() == Criticality::Required)
            .map(|s| s.id())
            .collect();
        assert_eq!(
            required,
            vec![
                StepId::InitPrefix,
                StepId::InstallTerminal,
                StepId::GenerateLoginConfig,
                StepId::InstallPython,
                StepId::InstallBridgePackages,
                StepId::DeployBridge,
            ]
        );
    }
}
