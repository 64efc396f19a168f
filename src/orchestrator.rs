//! Batch orchestrator: owns the working set of lists and drives the external
//! processor over them.
//!
//! Submodules:
//! - [`auxiliary`]: operator prompts (ASLAAS numbers, DOP cheque details).
//! - [`batch`]: `process_batch` and output-line handling.
//! - [`lot`]: saving and reloading the whole working set.
//! - [`observer`]: change notifications.
//! - [`processor`]: the processor seam and the script runner.
//! - [`types`]: reports and request payload types.

pub mod auxiliary;
mod batch;
pub mod lot;
pub mod observer;
pub mod processor;
pub mod types;


pub use auxiliary::{
    AslaasRequest, AuxiliaryInput, DopChequeRequest, DopChequeResponse, StaticAuxiliaryInput,
};
pub use lot::{LotReloadSummary, LotSnapshot};
pub use observer::{ListObserver, TracingObserver};
pub use processor::{BatchProcessor, BatchRequest, ProcessExit, ScriptProcessor};
pub use types::{
    AddedEntry, BatchMode, BatchOutcome, BatchReport, BulkAddSummary, DopChequeInput,
};

use crate::model::{
    normalize_aslaas, AccountDirectory, BatchList, EntryRejection, EntryStatus, ListEntry,
    PaymentMode, RunState, DEFAULT_ASLAAS,
};
use crate::reconcile;
use crate::runtime::config::BatchConfig;
use crate::runtime::guard::BatchGate;
use crate::runtime::telemetry::RunTelemetry;
use crate::store::{self, StateStore};
use chrono::Local;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub struct OrchestratorParams {
    pub config: BatchConfig,
    pub directory: Arc<dyn AccountDirectory>,
    pub processor: Arc<dyn BatchProcessor>,
    pub store: Arc<dyn StateStore>,
    pub auxiliary: Arc<dyn AuxiliaryInput>,
    pub observer: Arc<dyn ListObserver>,
}

/// Whether the caller already holds the batch gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Editing {
    Idle,
    GateHeld,
}

#[derive(Debug, Clone, Default)]
struct ChequeDefaults {
    cheque_no: String,
    payment_account_no: String,
}

/// Single owner of the session's lists.
///
/// Every mutation happens under one short-lived lock that is never held
/// across an `.await`; observers are notified after it is released.
pub struct BatchOrchestrator {
    config: BatchConfig,
    directory: Arc<dyn AccountDirectory>,
    processor: Arc<dyn BatchProcessor>,
    store: Arc<dyn StateStore>,
    auxiliary: Arc<dyn AuxiliaryInput>,
    observer: Arc<dyn ListObserver>,
    lists: Mutex<Vec<BatchList>>,
    pending_aslaas: Mutex<BTreeMap<String, String>>,
    cheque_defaults: Mutex<ChequeDefaults>,
    gate: Arc<BatchGate>,
    telemetry: Arc<RunTelemetry>,
}

impl BatchOrchestrator {
    /// Starts with one empty list.
    pub fn new(params: OrchestratorParams) -> Self {
        let OrchestratorParams {
            config,
            directory,
            processor,
            store,
            auxiliary,
            observer,
        } = params;

        let first = BatchList::with_ceiling(1, config.amount_ceiling());
        Self {
            config,
            directory,
            processor,
            store,
            auxiliary,
            observer,
            lists: Mutex::new(vec![first]),
            pending_aslaas: Mutex::new(BTreeMap::new()),
            cheque_defaults: Mutex::new(ChequeDefaults::default()),
            gate: Arc::new(BatchGate::new()),
            telemetry: Arc::new(RunTelemetry::default()),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<RunTelemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn is_processing(&self) -> bool {
        self.gate.is_busy()
    }

    /// Snapshot of every list in ordinal order.
    pub fn lists(&self) -> Vec<BatchList> {
        self.lock_lists().clone()
    }

    pub fn list(&self, ordinal: usize) -> Option<BatchList> {
        self.lock_lists()
            .iter()
            .find(|list| list.ordinal() == ordinal)
            .cloned()
    }

    /// Distinct references of successful lists, sorted case-insensitively.
    pub fn reference_numbers(&self) -> Vec<String> {
        let lists = self.lock_lists();
        let mut seen = HashSet::new();
        let mut references: Vec<String> = lists
            .iter()
            .filter(|list| list.state() == RunState::Success)
            .filter_map(|list| list.reference_number())
            .filter(|reference| seen.insert(reference.to_lowercase()))
            .map(str::to_owned)
            .collect();
        references.sort_by_key(|reference| reference.to_lowercase());
        references
    }

    pub fn has_failed_lists(&self) -> bool {
        self.lock_lists()
            .iter()
            .any(|list| list.state() == RunState::Failed)
    }

    /// ASLAAS numbers queued for accounts added without one.
    pub fn pending_aslaas(&self) -> BTreeMap<String, String> {
        self.lock_pending().clone()
    }

    /// Appends an empty list, restored from the store and the reference log
    /// like any other. Returns its ordinal.
    pub fn add_list(&self) -> usize {
        let index = reconcile::load_index(self.config.reference_log());
        let list = {
            let mut lists = self.lock_lists();
            let ordinal = lists.iter().map(BatchList::ordinal).max().unwrap_or(0) + 1;
            let mut list = BatchList::with_ceiling(ordinal, self.config.amount_ceiling());
            store::apply_to_list(self.store.as_ref(), &mut list);
            reconcile::reconcile(std::slice::from_mut(&mut list), &index, self.store.as_ref());
            lists.push(list.clone());
            list
        };
        debug!(list = list.ordinal(), "list added");
        self.observer.on_list_state_changed(&list);
        list.ordinal()
    }

    /// Looks the account up, prompts for an ASLAAS number when it has none,
    /// and appends it to list `ordinal`. Refused while a batch is running.
    pub async fn add_entry(
        &self,
        ordinal: usize,
        account_no: &str,
        installment: u32,
    ) -> Result<AddedEntry, EntryRejection> {
        self.report_add_entry(ordinal, account_no, installment, Editing::Idle)
            .await
    }

    async fn report_add_entry(
        &self,
        ordinal: usize,
        account_no: &str,
        installment: u32,
        editing: Editing,
    ) -> Result<AddedEntry, EntryRejection> {
        let result = self
            .try_add_entry(ordinal, account_no, installment, editing)
            .await;
        match &result {
            Ok(added) => self.observer.on_status(&added.message()),
            Err(rejection) => self.observer.on_status(&rejection.to_string()),
        }
        result
    }

    async fn try_add_entry(
        &self,
        ordinal: usize,
        account_no: &str,
        installment: u32,
        editing: Editing,
    ) -> Result<AddedEntry, EntryRejection> {
        if editing == Editing::Idle && self.gate.is_busy() {
            return Err(EntryRejection::Busy);
        }
        let account_no = account_no.trim().to_owned();
        if account_no.is_empty() {
            return Err(EntryRejection::BlankAccount);
        }
        if self.existing_accounts(ordinal)?.contains(&account_no) {
            return Err(EntryRejection::Duplicate(account_no));
        }

        let account = self
            .directory
            .find_account(&account_no)
            .await
            .map_err(|err| EntryRejection::Lookup(format!("{err:#}")))?
            .ok_or_else(|| EntryRejection::NotFound(account_no.clone()))?;

        let status = if account.is_due_within(self.config.due_soon_days(), Local::now().date_naive()) {
            EntryStatus::DueSoon
        } else {
            EntryStatus::Valid
        };
        let entry = ListEntry::new(account_no.clone(), installment, Some(account.clone()))
            .with_status(status);

        // A rejected add must never queue an ASLAAS number.
        self.check_entry(ordinal, &entry)?;

        let already_queued = self.lock_pending().contains_key(&account_no);
        let queued_aslaas = if account.has_aslaas() || already_queued {
            None
        } else {
            let request = AslaasRequest {
                account_no: account_no.clone(),
                account_name: account.account_name.clone(),
                suggested: DEFAULT_ASLAAS.to_owned(),
            };
            match self.auxiliary.request_aslaas(&request).await {
                Some(value) if !value.trim().is_empty() => Some(normalize_aslaas(&value)),
                _ => return Err(EntryRejection::AslaasRequired(account_no)),
            }
        };

        let (list, invalidated) = {
            let mut lists = self.lock_lists_for(editing)?;
            let existing = accounts_outside(&lists, ordinal);
            let list = find_list_mut(&mut lists, ordinal)?;
            let invalidated = list.add_entry(entry, &existing)?;
            (list.clone(), invalidated)
        };

        if let Some(aslaas) = queued_aslaas {
            self.lock_pending().insert(account_no.clone(), aslaas);
        }
        if invalidated {
            self.persist(&list);
            self.observer.on_list_state_changed(&list);
        }

        Ok(AddedEntry {
            list: ordinal,
            account_no,
            status,
            invalidated,
        })
    }

    /// Adds each account at one installment until the list is full.
    pub async fn add_accounts<S: AsRef<str>>(
        &self,
        ordinal: usize,
        accounts: &[S],
    ) -> Result<BulkAddSummary, EntryRejection> {
        find_list(&self.lock_lists(), ordinal)?;

        let mut summary = BulkAddSummary::default();
        for (index, account_no) in accounts.iter().enumerate() {
            let full = self.list(ordinal).map(|list| list.is_full()).unwrap_or(true);
            if full {
                summary.not_attempted = accounts[index..]
                    .iter()
                    .map(|account| account.as_ref().trim().to_owned())
                    .collect();
                break;
            }

            match self.add_entry(ordinal, account_no.as_ref(), 1).await {
                Ok(added) => summary.added.push(added.account_no),
                Err(rejection @ (EntryRejection::UnknownList(_) | EntryRejection::Busy)) => {
                    return Err(rejection);
                }
                Err(rejection) => summary
                    .rejected
                    .push((account_no.as_ref().trim().to_owned(), rejection.to_string())),
            }
        }
        Ok(summary)
    }

    /// Returns `false` when the account is not in the list.
    pub fn remove_entry(&self, ordinal: usize, account_no: &str) -> Result<bool, EntryRejection> {
        let removed = {
            let mut lists = self.lock_lists_for(Editing::Idle)?;
            let list = find_list_mut(&mut lists, ordinal)?;
            list.remove_entry(account_no)
                .map(|invalidated| (list.clone(), invalidated))
        };

        let Some((list, invalidated)) = removed else {
            return Ok(false);
        };
        if invalidated {
            self.persist(&list);
            self.observer.on_list_state_changed(&list);
        }
        self.observer
            .on_status(&format!("{} removed.", account_no.trim()));
        Ok(true)
    }

    pub fn clear_list(&self, ordinal: usize) -> Result<(), EntryRejection> {
        let (list, invalidated) = {
            let mut lists = self.lock_lists_for(Editing::Idle)?;
            let list = find_list_mut(&mut lists, ordinal)?;
            let invalidated = list.clear();
            (list.clone(), invalidated)
        };
        if invalidated {
            self.persist(&list);
            self.observer.on_list_state_changed(&list);
        }
        self.observer.on_status("List cleared.");
        Ok(())
    }

    /// Changes the payment mode; returns whether a settled state was reset.
    pub fn set_mode(&self, ordinal: usize, mode: PaymentMode) -> Result<bool, EntryRejection> {
        let (list, invalidated) = {
            let mut lists = self.lock_lists_for(Editing::Idle)?;
            let list = find_list_mut(&mut lists, ordinal)?;
            let invalidated = list.set_mode(mode);
            (list.clone(), invalidated)
        };
        if invalidated {
            self.persist(&list);
            self.observer.on_list_state_changed(&list);
        }
        Ok(invalidated)
    }

    /// Drops every list, every persisted record, and the ASLAAS queue, then
    /// starts over with one empty list.
    pub fn delete_all_lists(&self) -> anyhow::Result<()> {
        if self.gate.is_busy() {
            anyhow::bail!("cannot delete lists while processing is running");
        }

        {
            let mut lists = self.lock_lists();
            lists.clear();
            lists.push(BatchList::with_ceiling(1, self.config.amount_ceiling()));
        }
        self.lock_pending().clear();
        if let Err(err) = self.store.clear() {
            self.telemetry.record_persistence_error();
            warn!(error = %err, "failed to clear run-state store");
        }
        self.observer.on_status("All lists deleted.");
        Ok(())
    }

    /// Reapplies persisted outcomes and reconciles against the reference log.
    /// Returns the ordinals of lists that changed.
    pub fn restore_states(&self) -> Vec<usize> {
        let index = reconcile::load_index(self.config.reference_log());
        let (changed, reconciled_count) = {
            let mut lists = self.lock_lists();
            let mut changed: Vec<usize> = lists
                .iter_mut()
                .filter_map(|list| {
                    store::apply_to_list(self.store.as_ref(), list).then(|| list.ordinal())
                })
                .collect();
            let reconciled = reconcile::reconcile(lists.as_mut_slice(), &index, self.store.as_ref());
            let count = reconciled.len();
            for ordinal in reconciled {
                if !changed.contains(&ordinal) {
                    changed.push(ordinal);
                }
            }
            let snapshots: Vec<BatchList> = lists
                .iter()
                .filter(|list| changed.contains(&list.ordinal()))
                .cloned()
                .collect();
            (snapshots, count)
        };

        self.telemetry.record_reconciled(reconciled_count);
        for list in &changed {
            self.observer.on_list_state_changed(list);
        }
        changed.iter().map(BatchList::ordinal).collect()
    }

    fn check_entry(&self, ordinal: usize, entry: &ListEntry) -> Result<(), EntryRejection> {
        let lists = self.lock_lists();
        let existing = accounts_outside(&lists, ordinal);
        let mut probe = find_list(&lists, ordinal)?.clone();
        probe.add_entry(entry.clone(), &existing).map(|_| ())
    }

    fn existing_accounts(&self, ordinal: usize) -> Result<HashSet<String>, EntryRejection> {
        let lists = self.lock_lists();
        find_list(&lists, ordinal)?;
        Ok(lists
            .iter()
            .flat_map(|list| list.entries())
            .map(|entry| entry.account_no().to_owned())
            .collect())
    }

    /// Mirrors `list` into the store; failures are logged and swallowed.
    fn persist(&self, list: &BatchList) {
        if let Err(err) = store::sync_list(self.store.as_ref(), list) {
            self.telemetry.record_persistence_error();
            warn!(list = list.ordinal(), error = %err, "failed to persist list state");
        }
    }

    fn lock_lists(&self) -> MutexGuard<'_, Vec<BatchList>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the lists for a mutation. The gate is checked under the lock, so
    /// a batch that has claimed it always sees the lists it selected.
    fn lock_lists_for(
        &self,
        editing: Editing,
    ) -> Result<MutexGuard<'_, Vec<BatchList>>, EntryRejection> {
        let lists = self.lock_lists();
        if editing == Editing::Idle && self.gate.is_busy() {
            return Err(EntryRejection::Busy);
        }
        Ok(lists)
    }

    fn lock_pending(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.pending_aslaas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cheque_defaults(&self) -> MutexGuard<'_, ChequeDefaults> {
        self.cheque_defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_list(lists: &[BatchList], ordinal: usize) -> Result<&BatchList, EntryRejection> {
    lists
        .iter()
        .find(|list| list.ordinal() == ordinal)
        .ok_or(EntryRejection::UnknownList(ordinal))
}

fn find_list_mut(lists: &mut [BatchList], ordinal: usize) -> Result<&mut BatchList, EntryRejection> {
    lists
        .iter_mut()
        .find(|list| list.ordinal() == ordinal)
        .ok_or(EntryRejection::UnknownList(ordinal))
}

/// Account numbers held by every list except `ordinal`.
fn accounts_outside(lists: &[BatchList], ordinal: usize) -> HashSet<String> {
    lists
        .iter()
        .filter(|list| list.ordinal() != ordinal)
        .flat_map(|list| list.entries())
        .map(|entry| entry.account_no().to_owned())
        .collect()
}
