use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use crate::procs;

/// Liveness checks used by the monitor and the supervisor.
pub trait Probe {
    /// Whether any process command line contains `pattern`.
    fn process_running(&self, pattern: &str) -> bool;
    /// Whether a socket is in LISTEN state on `port`.
    fn port_listening(&self, port: u16) -> bool;
    /// Whether a loopback TCP connect to `port` succeeds within `timeout`.
    fn port_accepts(&self, port: u16, timeout: Duration) -> bool;
}

impl<T: Probe + ?Sized> Probe for &T {
    fn process_running(&self, pattern: &str) -> bool {
        (**self).process_running(pattern)
    }

    fn port_listening(&self, port: u16) -> bool {
        (**self).port_listening(port)
    }

    fn port_accepts(&self, port: u16, timeout: Duration) -> bool {
        (**self).port_accepts(port, timeout)
    }
}

/// Probes backed by `/proc` and real sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl Probe for SystemProbe {
    fn process_running(&self, pattern: &str) -> bool {
        match procs::find_matching(pattern) {
            Ok(pids) => !pids.is_empty(),
            Err(e) => {
                tracing::warn!(error = %e, "could not scan process table");
                false
            }
        }
    }

    fn port_listening(&self, port: u16) -> bool {
        procs::listening_ports().contains(&port)
    }

    fn port_accepts(&self, port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, timeout).is_ok()
    }
}
