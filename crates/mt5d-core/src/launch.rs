//! Command lines for the two long-running programs.

use std::ffi::OsString;
use std::process::Command;

use crate::config::Settings;
use crate::paths;
use crate::tool_runner;

/// Arguments after `wine` for the terminal.
///
/// `/portable` keeps all terminal data under its install directory. The
/// login ini is passed only when credentials are configured and the file
/// exists; otherwise the terminal starts in manual-login mode.
pub fn terminal_args(settings: &Settings) -> Vec<OsString> {
    let mut args = vec![
        settings.terminal_exe().into_os_string(),
        OsString::from("/portable"),
    ];
    let ini = settings.login_config();
    if settings.credentials().is_some() && ini.is_file() {
        let win = paths::to_windows_path(&settings.wine_prefix, &ini);
        args.push(OsString::from(format!("/config:{win}")));
    }
    args
}

pub fn terminal_command(settings: &Settings) -> Command {
    tool_runner::wine(settings, terminal_args(settings))
}

/// Arguments after `wine` for the bridge server.
pub fn bridge_args(settings: &Settings) -> Vec<OsString> {
    let script = paths::to_windows_path(
        &settings.wine_prefix,
        &paths::bridge_script(&settings.wine_prefix),
    );
    vec![
        settings.python_exe().into_os_string(),
        OsString::from(script),
        OsString::from("--host"),
        OsString::from(&settings.bridge_host),
        OsString::from("--port"),
        OsString::from(settings.bridge_port.to_string()),
    ]
}

pub fn bridge_command(settings: &Settings) -> Command {
    tool_runner::wine(settings, bridge_args(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{render_login_config, testing::Sandbox};

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn no_credentials_means_no_config_argument() {
        let sb = Sandbox::new(&[]);
        let args = strings(terminal_args(&sb.settings));
        assert_eq!(args.len(), 2);
        assert!(args[0].ends_with("terminal64.exe"));
        assert_eq!(args[1], "/portable");
        assert!(!args.iter().any(|a| a.starts_with("/config") || a.starts_with("/login")));
    }

    #[test]
    fn stale_ini_is_ignored_without_credentials() {
        let sb = Sandbox::new(&[]);
        let ini = sb.settings.login_config();
        std::fs::create_dir_all(ini.parent().unwrap()).unwrap();
        std::fs::write(&ini, "[Common]\nLogin=1\n").unwrap();
        let args = strings(terminal_args(&sb.settings));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn credentials_add_windows_config_path() {
        let sb = Sandbox::new(&[("MT5_LOGIN", "5012345"), ("MT5_PASSWORD", "hunter2-secret")]);
        let creds = sb.settings.credentials().unwrap();
        let ini = sb.settings.login_config();
        std::fs::create_dir_all(ini.parent().unwrap()).unwrap();
        std::fs::write(&ini, render_login_config(&creds)).unwrap();

        let args = strings(terminal_args(&sb.settings));
        assert_eq!(
            args[2],
            r"/config:C:\Program Files\MetaTrader 5\Config\mt5d-login.ini"
        );
        assert!(!args.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn bridge_binds_configured_host_and_port() {
        let sb = Sandbox::new(&[("MT5_BRIDGE_PORT", "18812")]);
        let args = strings(bridge_args(&sb.settings));
        assert!(args[0].ends_with("drive_c/Python/python.exe"));
        assert_eq!(&args[1..], [r"C:\bridge\bridge.py", "--host", "0.0.0.0", "--port", "18812"]);
    }
}
