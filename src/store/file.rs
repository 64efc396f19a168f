use super::record::RunStateRecord;
use super::{write_atomically, StateStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    states: Vec<RunStateRecord>,
}

/// JSON-file backed store. Every mutation rewrites the whole document.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    records: Mutex<HashMap<String, RunStateRecord>>,
}

impl FileStateStore {
    /// Opens the store at `path`. Missing or unreadable files start empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load_records(&path)
            .into_iter()
            .map(|record| (record.signature.clone(), record))
            .collect::<HashMap<_, _>>();
        debug!(path = %path.display(), records = records.len(), "run-state store loaded");

        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunStateRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, records: &HashMap<String, RunStateRecord>) -> Result<()> {
        let document = StateDocument {
            states: sorted_newest_first(records.values().cloned()),
        };
        let json = serde_json::to_vec_pretty(&document)?;
        write_atomically(&self.path, &json)
            .with_context(|| format!("failed to persist run state to {}", self.path.display()))
    }
}

impl StateStore for FileStateStore {
    fn get(&self, signature: &str) -> Option<RunStateRecord> {
        self.lock().get(signature).cloned()
    }

    fn persist(&self, record: RunStateRecord) -> Result<()> {
        let mut records = self.lock();
        records.insert(record.signature.clone(), record);
        self.flush(&records)
    }

    fn remove(&self, signature: &str) -> Result<bool> {
        let mut records = self.lock();
        if records.remove(signature).is_none() {
            return Ok(false);
        }
        self.flush(&records)?;
        Ok(true)
    }

    fn clear(&self) -> Result<()> {
        let mut records = self.lock();
        records.clear();
        self.flush(&records)
    }

    fn records(&self) -> Vec<RunStateRecord> {
        sorted_newest_first(self.lock().values().cloned())
    }
}

/// Reads every record with a non-blank signature from `path`.
///
/// Never fails: a missing file is silent, a corrupt one is logged and ignored.
pub fn load_records(path: &Path) -> Vec<RunStateRecord> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "run-state file unreadable; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<StateDocument>(&raw) {
        Ok(document) => document
            .states
            .into_iter()
            .filter(|record| !record.signature.trim().is_empty())
            .collect(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "run-state file corrupt; starting empty");
            Vec::new()
        }
    }
}

pub(super) fn sorted_newest_first(
    records: impl Iterator<Item = RunStateRecord>,
) -> Vec<RunStateRecord> {
    let mut records: Vec<_> = records.collect();
    records.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.signature.cmp(&b.signature))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStatus;
    use chrono::{Duration, Utc};

    #[test]
    fn missing_and_corrupt_files_load_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = FileStateStore::load(dir.path().join("absent.json"));
        assert!(missing.records().is_empty());

        let corrupt_path = dir.path().join("corrupt.json");
        std::fs::write(&corrupt_path, "{ not json")?;
        let corrupt = FileStateStore::load(&corrupt_path);
        assert!(corrupt.records().is_empty());
        Ok(())
    }

    #[test]
    fn failed_record_survives_reload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("State").join("list_processing_state.json");

        let store = FileStateStore::load(&path);
        store.persist(RunStateRecord::failed("020001,020002_2", "portal timeout"))?;
        drop(store);

        let reloaded = FileStateStore::load(&path);
        let record = reloaded.get("020001,020002_2").expect("record reloaded");
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.failure_reason, "portal timeout");
        Ok(())
    }

    #[test]
    fn document_is_written_newest_first() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state.json");
        let store = FileStateStore::load(&path);

        let mut older = RunStateRecord::success("a", "R1");
        older.updated_at = Utc::now() - Duration::minutes(5);
        store.persist(older)?;
        store.persist(RunStateRecord::success("b", "R2"))?;

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        let signatures: Vec<_> = raw["states"]
            .as_array()
            .expect("states array")
            .iter()
            .map(|state| state["signature"].as_str().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(signatures, vec!["b", "a"]);
        assert_eq!(raw["states"][0]["status"], "Success");
        Ok(())
    }

    #[test]
    fn remove_and_clear_rewrite_the_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state.json");
        let store = FileStateStore::load(&path);
        store.persist(RunStateRecord::success("a", "R1"))?;
        store.persist(RunStateRecord::failed("b", "x"))?;

        assert!(store.remove("a")?);
        assert!(!store.remove("a")?);
        assert_eq!(load_records(&path).len(), 1);

        store.clear()?;
        assert!(load_records(&path).is_empty());
        Ok(())
    }
}
