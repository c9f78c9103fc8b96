//! Process-wide configuration.
//!
//! `Settings` is resolved once at process entry from three layers, later ones
//! winning: built-in defaults, the build manifest baked into the image
//! (`<staging>/.versions`), and the process environment. The result is
//! immutable and handed to every component by reference.

use crate::error::{Mt5dError, Result};
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_WINE_PREFIX: &str = "/config/.wine";
pub const DEFAULT_STAGING_DIR: &str = "/opt/mt5-staging";
pub const DEFAULT_CACHE_DIR: &str = "/cache";
pub const DEFAULT_BRIDGE_SOURCE: &str = "/Metatrader";
pub const DEFAULT_STARTUP_MARKER: &str = "/tmp/.mt5-startup-complete";
pub const DEFAULT_RESTART_TOKEN: &str = "/tmp/.mt5-restart-requested";
pub const DEFAULT_SERVER: &str = "MetaQuotes-Demo";
pub const DEFAULT_BRIDGE_PORT: u16 = 8001;

const MT5_SETUP_URL: &str =
    "https://download.mql5.com/cdn/web/metaquotes.software.corp/mt5/mt5setup.exe";

static SUMMARY_LOGGED: AtomicBool = AtomicBool::new(false);

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versions {
    pub python: String,
    pub numpy: String,
    pub grpcio: String,
    pub protobuf: String,
    pub rpyc: String,
    pub plumbum: String,
    pub metatrader5: String,
    pub wine_mono: String,
    pub wine_gecko: String,
}

impl Versions {
    /// Manifest keys, in the order `render_manifest` writes them.
    pub const KEYS: [&'static str; 9] = [
        "PYTHON_VERSION",
        "NUMPY_VERSION",
        "GRPCIO_VERSION",
        "PROTOBUF_VERSION",
        "RPYC_VERSION",
        "PLUMBUM_VERSION",
        "METATRADER5_VERSION",
        "WINE_MONO_VERSION",
        "WINE_GECKO_VERSION",
    ];

    fn resolve(vars: &Vars) -> Self {
        Self {
            python: vars.string("PYTHON_VERSION", "3.12.8"),
            numpy: vars.string("NUMPY_VERSION", "1.26.4"),
            grpcio: vars.string("GRPCIO_VERSION", "1.76.0"),
            protobuf: vars.string("PROTOBUF_VERSION", "6.31.1"),
            rpyc: vars.string("RPYC_VERSION", "6.0.2"),
            plumbum: vars.string("PLUMBUM_VERSION", "1.9.0"),
            metatrader5: vars.string("METATRADER5_VERSION", "5.0.4874"),
            wine_mono: vars.string("WINE_MONO_VERSION", "9.4.0"),
            wine_gecko: vars.string("WINE_GECKO_VERSION", "2.47.4"),
        }
    }

    fn values(&self) -> [&str; 9] {
        [
            &self.python,
            &self.numpy,
            &self.grpcio,
            &self.protobuf,
            &self.rpyc,
            &self.plumbum,
            &self.metatrader5,
            &self.wine_mono,
            &self.wine_gecko,
        ]
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// A downloadable installer: the logical file name used by every cache tier,
/// and where to get it from the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub mt5_setup: Artifact,
    pub python_installer: Artifact,
    pub wine_mono: Artifact,
    pub wine_gecko: Artifact,
}

impl Artifacts {
    fn resolve(vars: &Vars, v: &Versions) -> Self {
        let python_name = format!("python-{}-amd64.exe", v.python);
        let mono_name = format!("wine-mono-{}-x86.msi", v.wine_mono);
        let gecko_name = format!("wine-gecko-{}-x86_64.msi", v.wine_gecko);
        Self {
            mt5_setup: Artifact {
                name: "mt5setup.exe".to_string(),
                url: vars.string("MT5_SETUP_URL", MT5_SETUP_URL),
            },
            python_installer: Artifact {
                url: vars.string(
                    "PYTHON_INSTALLER_URL",
                    &format!("https://www.python.org/ftp/python/{}/{python_name}", v.python),
                ),
                name: python_name,
            },
            wine_mono: Artifact {
                url: vars.string(
                    "WINE_MONO_URL",
                    &format!("https://dl.winehq.org/wine/wine-mono/{}/{mono_name}", v.wine_mono),
                ),
                name: mono_name,
            },
            wine_gecko: Artifact {
                url: vars.string(
                    "WINE_GECKO_URL",
                    &format!(
                        "https://dl.winehq.org/wine/wine-gecko/{}/{gecko_name}",
                        v.wine_gecko
                    ),
                ),
                name: gecko_name,
            },
        }
    }

    pub fn all(&self) -> [&Artifact; 4] {
        [
            &self.mt5_setup,
            &self.python_installer,
            &self.wine_mono,
            &self.wine_gecko,
        ]
    }
}

// ---------------------------------------------------------------------------
// HealthSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSettings {
    pub check_interval_secs: u64,
    pub auto_recovery: bool,
    pub failure_threshold: u32,
    pub restart_cooldown_secs: u64,
    pub max_restart_attempts: u32,
    pub stable_period_secs: u64,
}

impl HealthSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }

    pub fn stable_period(&self) -> Duration {
        Duration::from_secs(self.stable_period_secs)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
    pub server: String,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub wine_prefix: PathBuf,
    pub staging_dir: PathBuf,
    /// `None` when the external cache volume is disabled (`MT5_CACHE_DIR=`).
    pub cache_dir: Option<PathBuf>,
    pub bridge_source_dir: PathBuf,
    pub startup_marker: PathBuf,
    pub restart_token: PathBuf,

    pub wine_bin: String,
    pub winetricks_bin: String,
    pub linux_python: String,

    pub login: Option<String>,
    pub password: Option<String>,
    pub server: Option<String>,

    pub bridge_host: String,
    pub bridge_port: u16,

    pub health: HealthSettings,

    pub install_runtimes: bool,
    pub install_fonts: bool,

    pub installer_timeout_secs: u64,
    pub terminal_start_timeout_secs: u64,
    pub command_timeout_secs: u64,

    /// Requirement specifiers appended to the Windows-side bridge install.
    pub bridge_extra_packages: Vec<String>,
    /// pip requirement for the Linux client library (a name, a pin or a VCS URL).
    pub mt5linux_spec: String,

    pub versions: Versions,
    pub artifacts: Artifacts,
}

impl Settings {
    /// Resolve settings from the manifest under the staging directory and the
    /// current process environment.
    pub fn load() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let staging = env
            .get("MT5_STAGING_DIR")
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_STAGING_DIR.to_string());
        let manifest = read_manifest(&paths::versions_manifest(Path::new(&staging)))?;
        Self::from_sources(&manifest, &env)
    }

    /// Merge manifest and environment (environment wins) and resolve.
    pub fn from_sources(
        manifest: &HashMap<String, String>,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut merged = manifest.clone();
        merged.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::from_map(&merged)
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let vars = Vars(map);
        let versions = Versions::resolve(&vars);
        let artifacts = Artifacts::resolve(&vars, &versions);

        let cache_dir = match map.get("MT5_CACHE_DIR") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v.trim())),
            None => Some(PathBuf::from(DEFAULT_CACHE_DIR)),
        };

        Ok(Self {
            wine_prefix: vars.path("WINEPREFIX", DEFAULT_WINE_PREFIX),
            staging_dir: vars.path("MT5_STAGING_DIR", DEFAULT_STAGING_DIR),
            cache_dir,
            bridge_source_dir: vars.path("MT5_BRIDGE_SOURCE", DEFAULT_BRIDGE_SOURCE),
            startup_marker: vars.path("STARTUP_MARKER", DEFAULT_STARTUP_MARKER),
            restart_token: vars.path("RESTART_TOKEN", DEFAULT_RESTART_TOKEN),

            wine_bin: vars.string("WINE_BIN", "wine"),
            winetricks_bin: vars.string("WINETRICKS_BIN", "winetricks"),
            linux_python: vars.string("LINUX_PYTHON", "python3"),

            login: vars.opt("MT5_LOGIN"),
            password: vars.opt("MT5_PASSWORD"),
            server: vars.opt("MT5_SERVER"),

            bridge_host: vars.string("MT5_BRIDGE_HOST", "0.0.0.0"),
            bridge_port: vars.parse("MT5_BRIDGE_PORT", DEFAULT_BRIDGE_PORT)?,

            health: HealthSettings {
                check_interval_secs: vars.parse("HEALTH_CHECK_INTERVAL", 30)?,
                auto_recovery: vars.flag("AUTO_RECOVERY", true)?,
                failure_threshold: vars.parse("FAILURE_THRESHOLD", 3)?,
                restart_cooldown_secs: vars.parse("RESTART_COOLDOWN", 60)?,
                max_restart_attempts: vars.parse("MAX_RESTART_ATTEMPTS", 3)?,
                stable_period_secs: vars.parse("STABLE_PERIOD", 300)?,
            },

            install_runtimes: vars.flag("INSTALL_RUNTIMES", true)?,
            install_fonts: vars.flag("INSTALL_FONTS", false)?,

            installer_timeout_secs: vars.parse("INSTALLER_TIMEOUT", 300)?,
            terminal_start_timeout_secs: vars.parse("TERMINAL_START_TIMEOUT", 90)?,
            command_timeout_secs: vars.parse("COMMAND_TIMEOUT", 600)?,

            bridge_extra_packages: vars.list("BRIDGE_EXTRA_PACKAGES"),
            mt5linux_spec: vars.string("MT5LINUX_SPEC", "mt5linux"),

            versions,
            artifacts,
        })
    }

    // -----------------------------------------------------------------------
    // Derived paths
    // -----------------------------------------------------------------------

    pub fn terminal_exe(&self) -> PathBuf {
        paths::terminal_exe(&self.wine_prefix)
    }

    pub fn python_exe(&self) -> PathBuf {
        paths::python_exe(&self.wine_prefix)
    }

    pub fn bridge_dir(&self) -> PathBuf {
        paths::bridge_dir(&self.wine_prefix)
    }

    pub fn login_config(&self) -> PathBuf {
        paths::login_config(&self.wine_prefix)
    }

    pub fn state_file(&self) -> PathBuf {
        paths::state_file(&self.wine_prefix)
    }

    pub fn prefix_template(&self) -> PathBuf {
        paths::prefix_template(&self.staging_dir)
    }

    pub fn installer_timeout(&self) -> Duration {
        Duration::from_secs(self.installer_timeout_secs)
    }

    pub fn terminal_start_timeout(&self) -> Duration {
        Duration::from_secs(self.terminal_start_timeout_secs)
    }

    /// Upper bound for wineboot, reg, msiexec, winetricks and pip runs.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Login credentials, or `None` when auto-login is not configured.
    ///
    /// Both the account and the password are required; the server falls back
    /// to the broker demo server.
    pub fn credentials(&self) -> Option<Credentials> {
        let login = self.login.clone()?;
        let password = self.password.clone()?;
        Some(Credentials {
            login,
            password,
            server: self
                .server
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
        })
    }

    /// A copy safe to print: the password is masked.
    pub fn redacted(&self) -> Self {
        let mut s = self.clone();
        if s.password.is_some() {
            s.password = Some("********".to_string());
        }
        s
    }

    /// Fail when an external tool the orchestrator cannot work without is absent.
    pub fn require_tools(&self) -> Result<()> {
        which::which(&self.wine_bin).map_err(|_| Mt5dError::MissingTool(self.wine_bin.clone()))?;
        Ok(())
    }

    /// Emit the one-line summary of versions and cache locations.
    ///
    /// Only the first call in a process logs; returns whether this call did.
    pub fn log_summary(&self) -> bool {
        self.log_summary_once(&SUMMARY_LOGGED)
    }

    fn log_summary_once(&self, logged: &AtomicBool) -> bool {
        if logged.swap(true, Ordering::SeqCst) {
            return false;
        }
        let cache = self
            .cache_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "disabled".to_string());
        tracing::info!(
            prefix = %self.wine_prefix.display(),
            staging = %self.staging_dir.display(),
            cache = %cache,
            python = %self.versions.python,
            metatrader5 = %self.versions.metatrader5,
            grpcio = %self.versions.grpcio,
            numpy = %self.versions.numpy,
            wine_mono = %self.versions.wine_mono,
            wine_gecko = %self.versions.wine_gecko,
            "environment loaded"
        );
        true
    }

    /// Render the version pins as a build manifest (`KEY=value` lines).
    pub fn render_manifest(&self) -> String {
        let mut out = String::from("# Generated by mt5d prefetch\n");
        for (key, value) in Versions::KEYS.iter().zip(self.versions.values()) {
            out.push_str(&format!("{key}={value}\n"));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Manifest parsing
// ---------------------------------------------------------------------------

static KEY_RE: OnceLock<Regex> = OnceLock::new();

fn key_re() -> &'static Regex {
    KEY_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Parse `KEY=value` lines. Comments, blank lines, `export ` prefixes and
/// matching surrounding quotes are handled; malformed lines are ignored.
pub fn parse_manifest(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !key_re().is_match(key) {
            continue;
        }
        out.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    out
}

/// Read the manifest at `path`; a missing file is an empty manifest.
pub fn read_manifest(path: &Path) -> Result<HashMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_manifest(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

// ---------------------------------------------------------------------------
// Typed lookups over the merged variable map
// ---------------------------------------------------------------------------

struct Vars<'a>(&'a HashMap<String, String>);

impl Vars<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn path(&self, key: &str, default: &str) -> PathBuf {
        PathBuf::from(self.string(key, default))
    }

    /// Whitespace-separated words; unset or blank is empty.
    fn list(&self, key: &str) -> Vec<String> {
        self.opt(key)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.opt(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| Mt5dError::InvalidSetting {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.opt(key) {
            None => Ok(default),
            Some(raw) => parse_flag(&raw).ok_or_else(|| Mt5dError::InvalidSetting {
                key: key.to_string(),
                value: raw.clone(),
                reason: "expected true/false, yes/no, on/off or 1/0".to_string(),
            }),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
