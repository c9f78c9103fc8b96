use crate::error::Result;
use crate::types::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// StepRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// StepState
// ---------------------------------------------------------------------------

/// Completion markers for the one-time provisioning steps, kept in a single
/// YAML file at the prefix root.
///
/// A marker is trusted: once recorded, the step is not re-verified on later
/// runs. `clear` / `clear_all` are the explicit reset path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub steps: BTreeMap<StepId, StepRecord>,
}

fn default_version() -> u32 {
    1
}

impl StepState {
    pub fn new() -> Self {
        Self {
            version: 1,
            steps: BTreeMap::new(),
        }
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Load the store; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::new());
        }
        let state: StepState = serde_yaml::from_str(&data)?;
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // ---------------------------------------------------------------------------
    // Queries and mutations
    // ---------------------------------------------------------------------------

    pub fn is_done(&self, id: StepId) -> bool {
        self.steps.contains_key(&id)
    }

    pub fn record(&self, id: StepId) -> Option<&StepRecord> {
        self.steps.get(&id)
    }

    pub fn mark_done(&mut self, id: StepId) {
        self.steps.insert(
            id,
            StepRecord {
                completed_at: Utc::now(),
            },
        );
    }

    pub fn clear(&mut self, id: StepId) -> bool {
        self.steps.remove(&id).is_some()
    }

    pub fn clear_all(&mut self) -> usize {
        let n = self.steps.len();
        self.steps.clear();
        n
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let state = StepState::load(&dir.path().join(".mt5d-state.yaml")).unwrap();
        assert!(state.steps.is_empty());
        assert_eq!(state.version, 1);
    }

    #[test]
    fn mark_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".mt5d-state.yaml");
        let mut state = StepState::new();
        state.mark_done(StepId::InitPrefix);
        state.mark_done(StepId::DeployBridge);
        state.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("init-prefix"), "{text}");

        let loaded = StepState::load(&path).unwrap();
        assert!(loaded.is_done(StepId::InitPrefix));
        assert!(loaded.is_done(StepId::DeployBridge));
        assert!(!loaded.is_done(StepId::InstallTerminal));
    }

    #[test]
    fn clear_and_clear_all() {
        let mut state = StepState::new();
        state.mark_done(StepId::InitPrefix);
        state.mark_done(StepId::InstallFonts);
        assert!(state.clear(StepId::InstallFonts));
        assert!(!state.clear(StepId::InstallFonts));
        assert_eq!(state.clear_all(), 1);
        assert!(state.steps.is_empty());
    }

    #[test]
    fn empty_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".mt5d-state.yaml");
        std::fs::write(&path, "").unwrap();
        assert!(StepState::load(&path).unwrap().steps.is_empty());
    }
}
