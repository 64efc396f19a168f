//! Lot snapshots: the whole working set saved to one JSON document.

use super::{BatchOrchestrator, Editing};
use crate::model::{normalize_aslaas, AslaasUpdate, BatchList, PaymentMode, RunState};
use crate::store;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotSnapshot {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub pending_aslaas: Vec<AslaasUpdate>,
    #[serde(default)]
    pub lists: Vec<LotList>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotList {
    pub list_number: usize,
    #[serde(default)]
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub status: RunState,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub items: Vec<LotItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotItem {
    pub account_no: String,
    pub installment: u32,
}

impl LotSnapshot {
    pub fn capture(lists: &[BatchList], pending: impl IntoIterator<Item = AslaasUpdate>) -> Self {
        Self {
            generated_at: Utc::now(),
            pending_aslaas: pending.into_iter().collect(),
            lists: lists.iter().map(LotList::from_list).collect(),
        }
    }
}

impl LotList {
    fn from_list(list: &BatchList) -> Self {
        Self {
            list_number: list.ordinal(),
            payment_mode: list.mode(),
            status: list.state(),
            reference_number: list.reference_number().map(str::to_owned),
            failure_reason: list.failure_reason().map(str::to_owned),
            items: list
                .entries()
                .iter()
                .map(|entry| LotItem {
                    account_no: entry.account_no().to_owned(),
                    installment: entry.installment(),
                })
                .collect(),
        }
    }

    /// Success needs a reference; an interrupted Processing run comes back
    /// as Pending.
    fn apply_status(&self, list: &mut BatchList) {
        let reference = self.reference_number.as_deref().unwrap_or_default().trim();
        match self.status {
            RunState::Success if !reference.is_empty() => list.mark_success(reference),
            RunState::Failed => {
                list.mark_failed(self.failure_reason.as_deref().unwrap_or_default())
            }
            _ => list.mark_pending(),
        }
    }
}

/// Result of [`BatchOrchestrator::reload_lot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotReloadSummary {
    pub lists: usize,
    /// Accounts that failed revalidation and were left out.
    pub skipped: Vec<String>,
}

impl LotReloadSummary {
    pub fn message(&self) -> String {
        if self.skipped.is_empty() {
            format!("Reloaded {} list(s) from saved lot.", self.lists)
        } else {
            format!(
                "Reloaded {} list(s); skipped {} invalid/duplicate account(s).",
                self.lists,
                self.skipped.len()
            )
        }
    }
}

impl BatchOrchestrator {
    /// Writes the current working set to the configured lot file.
    pub fn save_lot(&self) -> Result<PathBuf> {
        let snapshot = {
            let lists = self.lock_lists();
            let pending = self
                .lock_pending()
                .iter()
                .map(|(account_no, aslaas)| AslaasUpdate::new(account_no.clone(), aslaas))
                .collect::<Vec<_>>();
            LotSnapshot::capture(&lists, pending)
        };

        let path = self.config.lot_file().to_path_buf();
        let bytes =
            serde_json::to_vec_pretty(&snapshot).context("failed to encode lot snapshot")?;
        store::write_atomically(&path, &bytes)?;

        info!(path = %path.display(), lists = snapshot.lists.len(), "lot saved");
        self.observer
            .on_status(&format!("Lot saved to: {}", path.display()));
        Ok(path)
    }

    /// Replaces the working set with the saved lot. Entries go back through
    /// the same validation as [`BatchOrchestrator::add_entry`], so accounts
    /// that no longer validate are skipped.
    pub async fn reload_lot(&self) -> Result<LotReloadSummary> {
        let Some(_guard) = self.gate.try_enter() else {
            bail!("Cannot reload while processing is running.");
        };

        let path = self.config.lot_file();
        if !path.is_file() {
            bail!("No saved lot found. Use Save Lot first.");
        }
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read lot file {}", path.display()))?;
        let snapshot: LotSnapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse lot file {}", path.display()))?;

        self.lock_lists().clear();
        {
            let mut pending = self.lock_pending();
            pending.clear();
            for update in &snapshot.pending_aslaas {
                let account_no = update.account_no.trim();
                if !account_no.is_empty() {
                    pending.insert(account_no.to_owned(), normalize_aslaas(&update.aslaas_no));
                }
            }
        }

        let mut summary = LotReloadSummary::default();
        for saved in &snapshot.lists {
            let ordinal = {
                let mut lists = self.lock_lists();
                let taken = saved.list_number == 0
                    || lists.iter().any(|list| list.ordinal() == saved.list_number);
                let ordinal = if taken {
                    lists.iter().map(BatchList::ordinal).max().unwrap_or(0) + 1
                } else {
                    saved.list_number
                };
                let mut list = BatchList::with_ceiling(ordinal, self.config.amount_ceiling());
                list.set_mode(saved.payment_mode);
                lists.push(list);
                ordinal
            };

            for item in &saved.items {
                let added = self
                    .report_add_entry(
                        ordinal,
                        &item.account_no,
                        item.installment,
                        Editing::GateHeld,
                    )
                    .await;
                if let Err(rejection) = added {
                    warn!(
                        list = ordinal,
                        account = %item.account_no,
                        %rejection,
                        "lot entry skipped"
                    );
                    summary.skipped.push(item.account_no.clone());
                }
            }

            let restored = {
                let mut lists = self.lock_lists();
                let list = lists.iter_mut().find(|list| list.ordinal() == ordinal);
                list.map(|list| {
                    saved.apply_status(list);
                    list.clone()
                })
            };
            if let Some(list) = restored {
                // A Pending snapshot leaves stored outcomes for restore_states.
                if list.state().is_settled() {
                    self.persist(&list);
                }
                self.observer.on_list_state_changed(&list);
            }
            summary.lists += 1;
        }

        {
            let mut lists = self.lock_lists();
            if lists.is_empty() {
                lists.push(BatchList::with_ceiling(1, self.config.amount_ceiling()));
            }
            lists.sort_by_key(BatchList::ordinal);
        }
        self.restore_states();

        info!(
            path = %path.display(),
            lists = summary.lists,
            skipped = summary.skipped.len(),
            "lot reloaded"
        );
        self.observer.on_status(&summary.message());
        Ok(summary)
    }
}
