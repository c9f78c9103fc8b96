use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Prefix layout constants (relative to the Wine prefix root)
// ---------------------------------------------------------------------------

pub const DRIVE_C: &str = "drive_c";
pub const SYSTEM_REG: &str = "system.reg";
pub const TERMINAL_DIR: &str = "drive_c/Program Files/MetaTrader 5";
pub const TERMINAL_EXE: &str = "terminal64.exe";
pub const PYTHON_DIR: &str = "drive_c/Python";
pub const PYTHON_EXE: &str = "python.exe";
pub const BRIDGE_DIR: &str = "drive_c/bridge";
pub const BRIDGE_SCRIPT: &str = "bridge.py";
pub const LOGIN_CONFIG: &str = "Config/mt5d-login.ini";
pub const STATE_FILE: &str = ".mt5d-state.yaml";

// ---------------------------------------------------------------------------
// Staging layout constants (relative to the image staging directory)
// ---------------------------------------------------------------------------

pub const VERSIONS_MANIFEST: &str = ".versions";
pub const PREFIX_TEMPLATE_DIR: &str = "prefix-template";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn drive_c(prefix: &Path) -> PathBuf {
    prefix.join(DRIVE_C)
}

pub fn terminal_dir(prefix: &Path) -> PathBuf {
    prefix.join(TERMINAL_DIR)
}

pub fn terminal_exe(prefix: &Path) -> PathBuf {
    terminal_dir(prefix).join(TERMINAL_EXE)
}

pub fn python_exe(prefix: &Path) -> PathBuf {
    prefix.join(PYTHON_DIR).join(PYTHON_EXE)
}

pub fn bridge_dir(prefix: &Path) -> PathBuf {
    prefix.join(BRIDGE_DIR)
}

pub fn bridge_script(prefix: &Path) -> PathBuf {
    bridge_dir(prefix).join(BRIDGE_SCRIPT)
}

pub fn login_config(prefix: &Path) -> PathBuf {
    terminal_dir(prefix).join(LOGIN_CONFIG)
}

pub fn state_file(prefix: &Path) -> PathBuf {
    prefix.join(STATE_FILE)
}

pub fn versions_manifest(staging: &Path) -> PathBuf {
    staging.join(VERSIONS_MANIFEST)
}

pub fn prefix_template(staging: &Path) -> PathBuf {
    staging.join(PREFIX_TEMPLATE_DIR)
}

/// Translate a host path into the path Windows programs see inside the prefix.
///
/// Anything under `<prefix>/drive_c` maps to `C:\...`; every other absolute
/// path goes through Wine's `Z:` mapping of the host root.
pub fn to_windows_path(prefix: &Path, path: &Path) -> String {
    let (drive, rest) = match path.strip_prefix(drive_c(prefix)) {
        Ok(rest) => ("C:", rest.to_path_buf()),
        Err(_) => ("Z:", path.to_path_buf()),
    };
    let tail = rest
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\\");
    format!("{drive}\\{tail}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let prefix = Path::new("/config/.wine");
        assert_eq!(
            terminal_exe(prefix),
            PathBuf::from("/config/.wine/drive_c/Program Files/MetaTrader 5/terminal64.exe")
        );
        assert_eq!(
            python_exe(prefix),
            PathBuf::from("/config/.wine/drive_c/Python/python.exe")
        );
        assert_eq!(
            state_file(prefix),
            PathBuf::from("/config/.wine/.mt5d-state.yaml")
        );
    }

    #[test]
    fn windows_path_inside_drive_c() {
        let prefix = Path::new("/config/.wine");
        assert_eq!(
            to_windows_path(prefix, &login_config(prefix)),
            "C:\\Program Files\\MetaTrader 5\\Config\\mt5d-login.ini"
        );
        assert_eq!(
            to_windows_path(prefix, &bridge_script(prefix)),
            "C:\\bridge\\bridge.py"
        );
    }

    #[test]
    fn windows_path_outside_prefix_uses_z_drive() {
        let prefix = Path::new("/config/.wine");
        assert_eq!(
            to_windows_path(prefix, Path::new("/tmp/mt5setup.exe")),
            "Z:\\tmp\\mt5setup.exe"
        );
    }
}
