//! Filesystem signals shared between the orchestrator, the monitor and the
//! supervisor. These are the only channel between the three processes.

use crate::error::Result;
use crate::io;
use chrono::Utc;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// StartupMarker
// ---------------------------------------------------------------------------

/// Present only after a fully successful orchestration run.
#[derive(Debug, Clone)]
pub struct StartupMarker {
    path: PathBuf,
}

impl StartupMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    pub fn set(&self) -> Result<()> {
        io::atomic_write(&self.path, format!("{}\n", Utc::now().to_rfc3339()).as_bytes())
    }

    pub fn clear(&self) -> Result<bool> {
        io::remove_if_exists(&self.path)
    }
}

// ---------------------------------------------------------------------------
// RestartToken
// ---------------------------------------------------------------------------

/// A pending restart request. Written by the monitor, consumed by the supervisor.
#[derive(Debug, Clone)]
pub struct RestartToken {
    path: PathBuf,
}

impl RestartToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn request(&self, reason: &str) -> Result<()> {
        io::atomic_write(&self.path, format!("{}\n", reason.trim()).as_bytes())
    }

    /// The pending reason, if a request exists.
    pub fn peek(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear(&self) -> Result<bool> {
        io::remove_if_exists(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn startup_marker_lifecycle() {
        let dir = TempDir::new().unwrap();
        let marker = StartupMarker::new(dir.path().join(".mt5-startup-complete"));
        assert!(!marker.is_set());
        marker.set().unwrap();
        assert!(marker.is_set());
        assert!(marker.clear().unwrap());
        assert!(!marker.is_set());
        assert!(!marker.clear().unwrap());
    }

    #[test]
    fn restart_token_carries_reason() {
        let dir = TempDir::new().unwrap();
        let token = RestartToken::new(dir.path().join(".mt5-restart-requested"));
        assert_eq!(token.peek().unwrap(), None);
        token.request("bridge: port 8001 not listening").unwrap();
        assert_eq!(
            token.peek().unwrap().as_deref(),
            Some("bridge: port 8001 not listening")
        );
        assert!(token.clear().unwrap());
        assert_eq!(token.peek().unwrap(), None);
    }
}
