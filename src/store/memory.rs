use super::file::sorted_newest_first;
use super::record::RunStateRecord;
use super::StateStore;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Non-durable store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, RunStateRecord>>,
}

impl MemoryStateStore {
    pub fn with_records(records: impl IntoIterator<Item = RunStateRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.signature.clone(), record))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, signature: &str) -> Option<RunStateRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signature)
            .cloned()
    }

    fn persist(&self, record: RunStateRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.signature.clone(), record);
        Ok(())
    }

    fn remove(&self, signature: &str) -> Result<bool> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(signature)
            .is_some())
    }

    fn clear(&self) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn records(&self) -> Vec<RunStateRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        sorted_newest_first(records.values().cloned())
    }
}
