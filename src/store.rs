//! Durable mapping from list signature to the last recorded outcome.
//!
//! - [`record`]: the persisted record and its status.
//! - [`file`]: JSON file store with atomic rewrites.
//! - [`memory`]: in-process store for tests and throwaway sessions.

pub mod file;
pub mod memory;
pub mod record;

pub use file::{load_records, FileStateStore};
pub use memory::MemoryStateStore;
pub use record::{RecordStatus, RunStateRecord};

use crate::model::{BatchList, RunState};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Signature-keyed outcome store. Implementations serialize their own writes.
pub trait StateStore: Send + Sync {
    fn get(&self, signature: &str) -> Option<RunStateRecord>;

    /// Upserts by signature and flushes.
    fn persist(&self, record: RunStateRecord) -> Result<()>;

    /// Drops the record for `signature`. Returns whether one existed.
    fn remove(&self, signature: &str) -> Result<bool>;

    fn clear(&self) -> Result<()>;

    /// All records, newest first.
    fn records(&self) -> Vec<RunStateRecord>;
}

/// Moves `list` to the outcome recorded for its current signature, if any.
/// Returns whether the list changed. Calling it twice is a no-op the second time.
pub fn apply_to_list(store: &dyn StateStore, list: &mut BatchList) -> bool {
    let signature = list.signature();
    if signature.is_empty() {
        return false;
    }
    match store.get(&signature) {
        Some(record) => record.apply_to(list),
        None => false,
    }
}

/// Mirrors the list's state into the store: settled states are upserted,
/// Pending and Processing drop the record for the current signature.
pub fn sync_list(store: &dyn StateStore, list: &BatchList) -> Result<()> {
    let signature = list.signature();
    if signature.is_empty() {
        return Ok(());
    }

    match list.state() {
        RunState::Success | RunState::Failed => {
            if let Some(record) = RunStateRecord::from_list(list) {
                store.persist(record)?;
            }
        }
        RunState::Pending | RunState::Processing => {
            store.remove(&signature)?;
        }
    }
    Ok(())
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_owned());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    {
        let mut file = std::fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to replace {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountRecord, ListEntry};
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn list_with(accounts: &[&str]) -> BatchList {
        let mut list = BatchList::new(1);
        for account in accounts {
            let entry = ListEntry::new(*account, 1, Some(AccountRecord::new(*account, dec!(100))));
            list.add_entry(entry, &HashSet::new()).unwrap();
        }
        list
    }

    #[test]
    fn apply_to_list_is_idempotent() -> Result<()> {
        let store = MemoryStateStore::default();
        store.persist(RunStateRecord::success("1,2", "REF9"))?;

        let mut list = list_with(&["1", "2"]);
        assert!(apply_to_list(&store, &mut list));
        assert_eq!(list.state(), RunState::Success);
        assert_eq!(list.reference_number(), Some("REF9"));

        let snapshot = list.clone();
        assert!(!apply_to_list(&store, &mut list));
        assert_eq!(list, snapshot);
        Ok(())
    }

    #[test]
    fn blank_success_reference_is_not_applied() -> Result<()> {
        let store = MemoryStateStore::default();
        store.persist(RunStateRecord::success("1", "  "))?;
        let mut list = list_with(&["1"]);
        assert!(!apply_to_list(&store, &mut list));
        assert_eq!(list.state(), RunState::Pending);
        Ok(())
    }

    #[test]
    fn sync_list_upserts_settled_and_drops_pending() -> Result<()> {
        let store = MemoryStateStore::default();
        let mut list = list_with(&["1"]);

        list.mark_failed("portal down");
        sync_list(&store, &list)?;
        let record = store.get("1").expect("record persisted");
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.failure_reason, "portal down");

        list.mark_processing();
        sync_list(&store, &list)?;
        assert!(store.get("1").is_none());
        Ok(())
    }

    #[test]
    fn empty_lists_are_never_recorded() -> Result<()> {
        let store = MemoryStateStore::default();
        let mut list = BatchList::new(3);
        list.mark_failed("nothing");
        sync_list(&store, &list)?;
        assert!(store.records().is_empty());
        Ok(())
    }
}
