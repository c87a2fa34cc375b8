//! Scheduler state file (spec.md §6 "Scheduler state file").

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// `{"last_run": {"<routine-name>": "YYYY-MM-DD"}}`, dates in each routine's
/// own timezone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerState {
    #[serde(default)]
    pub last_run: BTreeMap<String, String>,
}

impl SchedulerState {
    /// Missing file reads as an empty map (spec.md §4.7). A file that exists
    /// but fails to parse is treated the same way a scheduler-state read
    /// error should be (spec.md §7): logged elsewhere, not fatal here.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Atomic write-then-rename; creates the parent directory if missing.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        let body = serde_json::to_vec(self).expect("SchedulerState serializes infallibly");
        temp.write_all(&body)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let state = SchedulerState::load(&dir.path().join("state.json")).unwrap();
        assert!(state.last_run.is_empty());
    }

    #[test]
    fn save_then_load_round_trips_through_a_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        let mut state = SchedulerState::default();
        state.last_run.insert("daily-digest".to_string(), "2024-06-01".to_string());
        state.save(&path).unwrap();

        let loaded = SchedulerState::load(&path).unwrap();
        assert_eq!(loaded.last_run.get("daily-digest"), Some(&"2024-06-01".to_string()));
    }

    #[test]
    fn a_corrupt_state_file_reads_as_an_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();
        let state = SchedulerState::load(&path).unwrap();
        assert!(state.last_run.is_empty());
    }
}
