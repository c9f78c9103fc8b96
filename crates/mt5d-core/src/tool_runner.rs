//! Subprocess invocation for the external tools the install steps drive.
//!
//! Every Wine-side command runs with `WINEPREFIX` pointing at the managed
//! prefix and Wine's debug channels silenced. Output is captured so that a
//! failing command's stderr tail ends up in the step failure reason.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::{Mt5dError, Result};
use crate::procs;

/// Characters of stderr kept in a command failure message.
const STDERR_TAIL: usize = 500;

const WAIT_POLL: Duration = Duration::from_millis(100);

/// SIGTERM to SIGKILL delay for a command that overran its timeout.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// `wine <args...>` against the managed prefix.
pub fn wine<I, S>(settings: &Settings, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(&settings.wine_bin);
    cmd.args(args);
    wine_env(&mut cmd, settings);
    cmd
}

/// `winetricks -q <verbs...>` against the managed prefix.
pub fn winetricks<I, S>(settings: &Settings, verbs: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(&settings.winetricks_bin);
    cmd.arg("-q").args(verbs);
    wine_env(&mut cmd, settings);
    cmd
}

/// The Windows Python inside the prefix, run through Wine.
pub fn windows_python<I, S>(settings: &Settings, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = wine(settings, [settings.python_exe().into_os_string()]);
    cmd.args(args);
    cmd
}

/// The Linux-side Python interpreter.
pub fn linux_python<I, S>(settings: &Settings, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(&settings.linux_python);
    cmd.args(args);
    cmd
}

fn wine_env(cmd: &mut Command, settings: &Settings) {
    cmd.env("WINEPREFIX", &settings.wine_prefix);
    cmd.env("WINEDEBUG", "-all");
}

/// Human-readable command line for logs and error messages.
pub fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run to completion with captured output, bounded by `timeout`; a non-zero
/// exit is an error carrying the tail of stderr.
///
/// The command leads its own process group. On timeout the whole group is
/// stopped and `Mt5dError::Timeout` returned.
pub fn run_checked(cmd: &mut Command, timeout: Duration, clock: &dyn Clock) -> Result<Output> {
    let described = describe(cmd);
    tracing::debug!(command = %described, timeout_secs = timeout.as_secs(), "running");

    // Captured into files: nothing drains a pipe while we poll.
    let mut stdout = tempfile::tempfile()?;
    let mut stderr = tempfile::tempfile()?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(stdout.try_clone()?))
        .stderr(Stdio::from(stderr.try_clone()?));
    let mut child = procs::spawn_in_group(cmd)?;

    let deadline = clock.now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if clock.now() >= deadline {
            tracing::warn!(command = %described, timeout_secs = timeout.as_secs(), "command timed out, stopping it");
            procs::terminate_child(&mut child, KILL_GRACE, clock)?;
            return Err(Mt5dError::Timeout {
                what: described,
                secs: timeout.as_secs(),
            });
        }
        clock.sleep(WAIT_POLL);
    };

    let output = Output {
        status,
        stdout: read_back(&mut stdout)?,
        stderr: read_back(&mut stderr)?,
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = {
            let trimmed = stderr.trim();
            let skip = trimmed.chars().count().saturating_sub(STDERR_TAIL);
            trimmed.chars().skip(skip).collect()
        };
        let reason = if tail.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}: {tail}", output.status)
        };
        return Err(Mt5dError::Command {
            command: described,
            reason,
        });
    }
    Ok(output)
}

/// Run and return trimmed stdout.
pub fn run_stdout(cmd: &mut Command, timeout: Duration, clock: &dyn Clock) -> Result<String> {
    let output = run_checked(cmd, timeout, clock)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn read_back(file: &mut File) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use std::collections::HashMap;
    use std::time::Instant;

    const T: Duration = Duration::from_secs(30);

    fn settings() -> Settings {
        let mut m = HashMap::new();
        m.insert("WINEPREFIX".to_string(), "/tmp/prefix".to_string());
        m.insert("WINE_BIN".to_string(), "/usr/bin/wine".to_string());
        Settings::from_map(&m).unwrap()
    }

    #[test]
    fn wine_command_targets_prefix() {
        let s = settings();
        let cmd = wine(&s, ["wineboot", "--init"]);
        assert_eq!(describe(&cmd), "/usr/bin/wine wineboot --init");
        let envs: HashMap<_, _> = cmd
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_string_lossy().into_owned(), v?.to_string_lossy().into_owned())))
            .collect();
        assert_eq!(envs["WINEPREFIX"], "/tmp/prefix");
        assert_eq!(envs["WINEDEBUG"], "-all");
    }

    #[test]
    fn windows_python_runs_through_wine() {
        let s = settings();
        let cmd = windows_python(&s, ["--version"]);
        assert_eq!(
            describe(&cmd),
            "/usr/bin/wine /tmp/prefix/drive_c/Python/python.exe --version"
        );
    }

    #[test]
    fn run_checked_reports_stderr_tail() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo boom >&2; exit 3"]);
        let err = run_checked(&mut cmd, T, &SystemClock).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("boom"), "{msg}");
        assert!(msg.contains("sh -c"), "{msg}");
    }

    #[test]
    fn run_stdout_trims() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo '  Python 3.12.8  '"]);
        assert_eq!(run_stdout(&mut cmd, T, &SystemClock).unwrap(), "Python 3.12.8");
    }

    #[test]
    fn missing_program_is_a_command_error() {
        let mut cmd = Command::new("/nonexistent/mt5d-tool");
        assert!(matches!(run_checked(&mut cmd, T, &SystemClock), Err(Mt5dError::Command { .. })));
    }

    #[test]
    fn large_output_does_not_stall() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "head -c 300000 /dev/zero | tr '\\0' x; echo; echo done >&2"]);
        let out = run_checked(&mut cmd, T, &SystemClock).unwrap();
        assert_eq!(out.stdout.len(), 300_001);
        assert_eq!(String::from_utf8_lossy(&out.stderr).trim(), "done");
    }

    #[test]
    fn overrunning_command_is_stopped_at_timeout() {
        let clock = ManualClock::paced(Duration::from_millis(5));
        let started = Instant::now();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30; echo late"]);

        let err = run_checked(&mut cmd, Duration::from_secs(1), &clock).unwrap_err();
        match err {
            Mt5dError::Timeout { what, secs } => {
                assert!(what.starts_with("sh -c"), "{what}");
                assert_eq!(secs, 1);
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert!(clock.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(10), "group was not stopped");
    }
}
