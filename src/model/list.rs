use super::entry::ListEntry;
use super::mode::PaymentMode;
use crate::codec;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Amount ceiling applied to cash and non-DOP cheque lists.
pub const AMOUNT_CEILING: Decimal = Decimal::from_parts(20_000, 0, 0, false, 0);

/// Run state of a list. Success and Failed are sticky until the list's
/// payload or payment mode changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Pending => "Pending",
            RunState::Processing => "Processing",
            RunState::Success => "Completed",
            RunState::Failed => "Failed",
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, RunState::Success | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reason an entry was not added. Rejections never mutate the list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryRejection {
    #[error("Enter an account number.")]
    BlankAccount,
    #[error("{0} not found in database.")]
    NotFound(String),
    #[error("{0} already exists in a list.")]
    Duplicate(String),
    #[error("Cannot add {account_no}. This list is limited to Rs. {ceiling}.")]
    OverCeiling { account_no: String, ceiling: String },
    #[error("{0} requires ASLAAS before adding.")]
    AslaasRequired(String),
    #[error("list {0} does not exist")]
    UnknownList(usize),
    #[error("account lookup failed: {0}")]
    Lookup(String),
    #[error("Cannot edit lists while processing is running.")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settled {
    signature: String,
    mode: PaymentMode,
}

/// Ordered group of accounts submitted together as one payload segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchList {
    ordinal: usize,
    entries: Vec<ListEntry>,
    mode: PaymentMode,
    ceiling: Decimal,
    state: RunState,
    reference_number: Option<String>,
    failure_reason: Option<String>,
    settled: Option<Settled>,
}

impl BatchList {
    pub fn new(ordinal: usize) -> Self {
        Self::with_ceiling(ordinal, AMOUNT_CEILING)
    }

    pub fn with_ceiling(ordinal: usize, ceiling: Decimal) -> Self {
        Self {
            ordinal: ordinal.max(1),
            entries: Vec::new(),
            mode: PaymentMode::Cash,
            ceiling,
            state: RunState::Pending,
            reference_number: None,
            failure_reason: None,
            settled: None,
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// `List {ordinal}`, or the reference number once the list succeeded.
    pub fn name(&self) -> String {
        match (&self.state, &self.reference_number) {
            (RunState::Success, Some(reference)) => reference.clone(),
            _ => format!("List {}", self.ordinal),
        }
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    pub fn contains(&self, account_no: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.account_no() == account_no.trim())
    }

    pub fn mode(&self) -> PaymentMode {
        self.mode
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn reference_number(&self) -> Option<&str> {
        self.reference_number.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn ceiling(&self) -> Option<Decimal> {
        self.mode.is_ceiling_bound().then_some(self.ceiling)
    }

    pub fn total(&self) -> Decimal {
        self.entries
            .iter()
            .filter(|entry| entry.participates())
            .map(ListEntry::total)
            .sum()
    }

    /// Headroom under the ceiling; zero for unbounded lists.
    pub fn remaining(&self) -> Decimal {
        match self.ceiling() {
            Some(ceiling) => (ceiling - self.total()).max(Decimal::ZERO),
            None => Decimal::ZERO,
        }
    }

    pub fn is_full(&self) -> bool {
        self.ceiling()
            .map(|ceiling| self.total() >= ceiling)
            .unwrap_or(false)
    }

    pub fn has_processable_entries(&self) -> bool {
        self.entries.iter().any(ListEntry::participates)
    }

    pub fn signature(&self) -> String {
        codec::signature(&self.entries)
    }

    pub fn payload_token(&self) -> String {
        codec::payload_token(&self.entries)
    }

    pub fn payload_with_mode(&self) -> String {
        codec::payload_with_mode(self.mode, &self.entries)
    }

    /// Appends `entry` after checking, in order: blank account, unresolved
    /// account, duplicates across `existing` and this list, and the ceiling.
    ///
    /// Returns `Ok(true)` when the insertion invalidated a settled state.
    pub fn add_entry(
        &mut self,
        entry: ListEntry,
        existing: &HashSet<String>,
    ) -> Result<bool, EntryRejection> {
        let account_no = entry.account_no().to_owned();
        if account_no.is_empty() {
            return Err(EntryRejection::BlankAccount);
        }
        if entry.account().is_none() {
            return Err(EntryRejection::NotFound(account_no));
        }
        if existing.contains(&account_no) || self.contains(&account_no) {
            return Err(EntryRejection::Duplicate(account_no));
        }
        if let Some(ceiling) = self.ceiling() {
            if self.total() + entry.total() > ceiling {
                return Err(EntryRejection::OverCeiling {
                    account_no,
                    ceiling: format_amount(ceiling),
                });
            }
        }

        self.entries.push(entry);
        Ok(self.invalidate_if_stale())
    }

    /// Removes the entry for `account_no`. Returns `None` when absent, else
    /// whether the removal invalidated a settled state.
    pub fn remove_entry(&mut self, account_no: &str) -> Option<bool> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.account_no() == account_no.trim())?;
        self.entries.remove(position);
        Some(self.invalidate_if_stale())
    }

    pub fn clear(&mut self) -> bool {
        self.entries.clear();
        self.invalidate_if_stale()
    }

    /// Switching away from the mode a settled state was recorded under resets
    /// the list to Pending.
    pub fn set_mode(&mut self, mode: PaymentMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;

        match &self.settled {
            Some(settled) if settled.mode != mode => {
                self.settled = None;
                self.mark_pending();
                true
            }
            _ => false,
        }
    }

    pub fn mark_pending(&mut self) {
        self.state = RunState::Pending;
        self.reference_number = None;
        self.failure_reason = None;
    }

    pub fn mark_processing(&mut self) {
        self.state = RunState::Processing;
        self.reference_number = None;
        self.failure_reason = None;
    }

    pub fn mark_success(&mut self, reference_number: &str) {
        let reference = reference_number.trim();
        self.reference_number = (!reference.is_empty()).then(|| reference.to_owned());
        self.failure_reason = None;
        self.state = RunState::Success;
        self.settle();
    }

    /// Blank reasons are replaced with a generic message.
    pub fn mark_failed(&mut self, reason: &str) {
        let reason = reason.trim();
        self.failure_reason = Some(if reason.is_empty() {
            codec::GENERIC_FAILURE.to_owned()
        } else {
            reason.to_owned()
        });
        self.reference_number = None;
        self.state = RunState::Failed;
        self.settle();
    }

    fn settle(&mut self) {
        self.settled = Some(Settled {
            signature: self.signature(),
            mode: self.mode,
        });
    }

    fn invalidate_if_stale(&mut self) -> bool {
        let stale = match &self.settled {
            Some(settled) => settled.signature != self.signature(),
            None => false,
        };
        if stale {
            self.settled = None;
            self.mark_pending();
        }
        stale
    }
}

fn format_amount(amount: Decimal) -> String {
    let whole = amount.trunc().to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
