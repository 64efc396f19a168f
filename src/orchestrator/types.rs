use crate::model::EntryStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which lists a batch run selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Every list with participating entries that has not succeeded.
    All,
    /// Only lists whose last run failed.
    RetryFailedOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed,
    CompletedWithFailures,
    ProcessFailed,
    NothingToProcess,
    Cancelled,
    AlreadyRunning,
}

impl BatchOutcome {
    /// `true` when the processor was never invoked.
    pub fn is_noop(self) -> bool {
        matches!(
            self,
            BatchOutcome::NothingToProcess | BatchOutcome::Cancelled | BatchOutcome::AlreadyRunning
        )
    }
}

/// Summary of one `process_batch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub mode: BatchMode,
    pub outcome: BatchOutcome,
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: String,
}

impl BatchReport {
    pub(crate) fn noop(mode: BatchMode, outcome: BatchOutcome, status: impl Into<String>) -> Self {
        Self {
            mode,
            outcome,
            selected: 0,
            succeeded: 0,
            failed: 0,
            status: status.into(),
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status)
    }
}

/// Confirmation returned when an entry was added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedEntry {
    pub list: usize,
    pub account_no: String,
    pub status: EntryStatus,
    /// The insertion reset a settled list to Pending.
    pub invalidated: bool,
}

impl AddedEntry {
    pub fn message(&self) -> String {
        match self.status {
            EntryStatus::DueSoon => format!("{} added (due soon).", self.account_no),
            EntryStatus::Valid => format!("{} added.", self.account_no),
        }
    }
}

/// Result of a bulk add.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkAddSummary {
    pub added: Vec<String>,
    pub rejected: Vec<(String, String)>,
    /// Accounts never attempted because the list filled up.
    pub not_attempted: Vec<String>,
}

/// Cheque details for one entry of a DOP cheque list, passed to the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DopChequeInput {
    /// 1-based position of the list in the submitted payload.
    pub list_index: usize,
    pub account_no: String,
    pub cheque_no: String,
    pub payment_account_no: String,
}
