//! Process-table and socket-table access through `/proc`, plus the signalling
//! helpers shared by the installer watch and the supervisor.

use std::collections::BTreeSet;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::clock::Clock;
use crate::error::{Mt5dError, Result};

const PROC_ROOT: &str = "/proc";

/// Interval between liveness polls while waiting for a signalled child.
const REAP_POLL: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Process table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub cmdline: String,
}

/// Every readable process under `root` (normally `/proc`), with its NUL
/// separated command line joined by spaces. Kernel threads are skipped.
pub fn scan_processes(root: &Path) -> Result<Vec<ProcessInfo>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let Ok(entry) = entry else { continue };
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        // Processes exit between readdir and read; that is not an error.
        let Ok(raw) = std::fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let cmdline = decode_cmdline(&raw);
        if cmdline.is_empty() {
            continue;
        }
        out.push(ProcessInfo { pid, cmdline });
    }
    Ok(out)
}

fn decode_cmdline(raw: &[u8]) -> String {
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pids whose command line contains `pattern`, excluding this process.
pub fn find_matching(pattern: &str) -> Result<Vec<i32>> {
    let me = std::process::id() as i32;
    Ok(scan_processes(Path::new(PROC_ROOT))?
        .into_iter()
        .filter(|p| p.pid != me && p.cmdline.contains(pattern))
        .map(|p| p.pid)
        .collect())
}

/// Send `signal` to every process whose command line contains `pattern`.
/// Returns how many were signalled.
pub fn signal_matching(pattern: &str, signal: Signal) -> Result<usize> {
    let mut sent = 0;
    for pid in find_matching(pattern)? {
        if kill(Pid::from_raw(pid), signal).is_ok() {
            sent += 1;
        }
    }
    if sent > 0 {
        tracing::debug!(pattern, ?signal, count = sent, "signalled stray processes");
    }
    Ok(sent)
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

/// Spawn `cmd` as the leader of a new process group so the whole tree can be
/// signalled at once.
pub fn spawn_in_group(cmd: &mut Command) -> Result<Child> {
    cmd.process_group(0);
    cmd.spawn().map_err(|e| Mt5dError::Command {
        command: crate::tool_runner::describe(cmd),
        reason: e.to_string(),
    })
}

/// Spawn a process that outlives this one: own process group, stdin closed.
/// Output stays on the inherited stdout/stderr.
pub fn spawn_detached(cmd: &mut Command) -> Result<u32> {
    cmd.stdin(Stdio::null());
    let child = spawn_in_group(cmd)?;
    Ok(child.id())
}

/// Signal the process group led by `child`.
pub fn signal_group(child: &Child, signal: Signal) {
    let pgid = Pid::from_raw(-(child.id() as i32));
    let _ = kill(pgid, signal);
}

/// SIGTERM the child's group, wait up to `grace`, then SIGKILL and reap.
pub fn terminate_child(child: &mut Child, grace: Duration, clock: &dyn Clock) -> Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    signal_group(child, Signal::SIGTERM);
    let deadline = clock.now() + grace;
    while clock.now() < deadline {
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        clock.sleep(REAP_POLL);
    }
    tracing::warn!(pid = child.id(), "did not exit after SIGTERM, sending SIGKILL");
    signal_group(child, Signal::SIGKILL);
    let _ = child.kill();
    child.wait()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Socket table
// ---------------------------------------------------------------------------

const TCP_LISTEN: &str = "0A";

/// Local ports in LISTEN state from the text of `/proc/net/tcp` or
/// `/proc/net/tcp6`.
pub fn parse_listening_ports(table: &str) -> BTreeSet<u16> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let local = fields.nth(1)?;
            let state = fields.nth(1)?;
            if state != TCP_LISTEN {
                return None;
            }
            let (_, port_hex) = local.rsplit_once(':')?;
            u16::from_str_radix(port_hex, 16).ok()
        })
        .collect()
}

/// Listening TCP ports across IPv4 and IPv6. Missing tables count as empty.
pub fn listening_ports() -> BTreeSet<u16> {
    let mut ports = BTreeSet::new();
    for table in ["net/tcp", "net/tcp6"] {
        if let Ok(text) = std::fs::read_to_string(Path::new(PROC_ROOT).join(table)) {
            ports.extend(parse_listening_ports(&text));
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use tempfile::TempDir;

    const TCP_TABLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:1F41 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12345 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1770 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12346 1 0000000000000000 100 0 0 10 0
   2: 0100007F:9C40 0100007F:1F41 01 00000000:00000000 00:00000000 00000000     0        0 12347 1 0000000000000000 20 4 30 10 -1
";

    const TCP6_TABLE: &str = "\
  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000000000000:1F90 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 22222 1 0000000000000000 100 0 0 10 0
";

    #[test]
    fn parses_listen_rows_only() {
        let ports = parse_listening_ports(TCP_TABLE);
        assert_eq!(ports.into_iter().collect::<Vec<_>>(), vec![6000, 8001]);
    }

    #[test]
    fn parses_ipv6_table() {
        let ports = parse_listening_ports(TCP6_TABLE);
        assert!(ports.contains(&8080));
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_listening_ports("").is_empty());
        assert!(parse_listening_ports("header\nnot a row\n").is_empty());
    }

    #[test]
    fn scan_reads_fake_proc_tree() {
        let dir = TempDir::new().unwrap();
        let p1 = dir.path().join("101");
        std::fs::create_dir(&p1).unwrap();
        std::fs::write(
            p1.join("cmdline"),
            b"wine\0C:\\Program Files\\MetaTrader 5\\terminal64.exe\0/portable\0",
        )
        .unwrap();
        let kthread = dir.path().join("2");
        std::fs::create_dir(&kthread).unwrap();
        std::fs::write(kthread.join("cmdline"), b"").unwrap();
        std::fs::create_dir(dir.path().join("self")).unwrap();

        let procs = scan_processes(dir.path()).unwrap();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].pid, 101);
        assert!(procs[0].cmdline.contains("terminal64.exe /portable"));
    }

    #[test]
    fn find_matching_sees_live_child() {
        let marker = "mt5d-procs-test-7d1f";
        // Two commands keep the shell alive instead of exec'ing into sleep.
        let mut child =
            spawn_in_group(Command::new("sh").args(["-c", &format!("sleep 30; echo {marker}")]))
                .unwrap();
        // /proc/<pid>/cmdline is populated once exec completes.
        let mut found = Vec::new();
        for _ in 0..50 {
            found = find_matching(marker).unwrap();
            if !found.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(found.contains(&(child.id() as i32)));
        terminate_child(&mut child, Duration::from_secs(5), &SystemClock).unwrap();
    }

    #[test]
    fn terminate_child_stops_group() {
        let mut child = spawn_in_group(Command::new("sleep").arg("30")).unwrap();
        terminate_child(&mut child, Duration::from_secs(5), &SystemClock).unwrap();
        assert!(child.try_wait().unwrap().is_some());
    }
}
