//! Account directory seam. The orchestrator only needs lookups by account
//! number and a way to write back confirmed ASLAAS numbers.

use super::account::{AccountRecord, AslaasUpdate};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub trait AccountDirectory: Send + Sync {
    fn find_account<'a>(&'a self, account_no: &'a str)
        -> BoxFuture<'a, Result<Option<AccountRecord>>>;

    fn save_aslaas_updates<'a>(&'a self, updates: &'a [AslaasUpdate]) -> BoxFuture<'a, Result<()>>;
}

/// In-memory directory, optionally backed by a JSON array of account records
/// that is rewritten whenever ASLAAS numbers are saved.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    accounts: Mutex<HashMap<String, AccountRecord>>,
    backing_file: Option<PathBuf>,
}

impl MemoryDirectory {
    pub fn from_records(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        let accounts = records
            .into_iter()
            .map(|record| (record.account_no.trim().to_owned(), record))
            .collect();
        Self {
            accounts: Mutex::new(accounts),
            backing_file: None,
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read account directory {}", path.display()))?;
        let records: Vec<AccountRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid account directory {}", path.display()))?;

        let mut directory = Self::from_records(records);
        directory.backing_file = Some(path.to_path_buf());
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, account_no: &str) -> Option<AccountRecord> {
        self.lock().get(account_no.trim()).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, AccountRecord>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_back(&self, records: Vec<AccountRecord>) -> Result<()> {
        let Some(path) = &self.backing_file else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&records)?;
        crate::store::write_atomically(path, json.as_bytes())
            .with_context(|| format!("failed to rewrite account directory {}", path.display()))
    }
}

impl AccountDirectory for MemoryDirectory {
    fn find_account<'a>(
        &'a self,
        account_no: &'a str,
    ) -> BoxFuture<'a, Result<Option<AccountRecord>>> {
        Box::pin(async move { Ok(self.get(account_no)) })
    }

    fn save_aslaas_updates<'a>(&'a self, updates: &'a [AslaasUpdate]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let snapshot = {
                let mut accounts = self.lock();
                for update in updates {
                    if let Some(record) = accounts.get_mut(&update.account_no) {
                        record.aslaas_no = update.aslaas_no.clone();
                    }
                }
                let mut records: Vec<_> = accounts.values().cloned().collect();
                records.sort_by(|a, b| a.account_no.cmp(&b.account_no));
                records
            };
            self.write_back(snapshot)
        })
    }
}
