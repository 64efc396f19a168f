use super::auxiliary::DopChequeRequest;
use super::processor::{BatchRequest, ProcessExit};
use super::types::{BatchMode, BatchOutcome, BatchReport, DopChequeInput};
use super::BatchOrchestrator;
use crate::codec::{self, ProgressEvent};
use crate::model::{normalize_aslaas, AslaasUpdate, BatchList, PaymentMode, RunState};
use crate::runtime::progress::SubmissionProgress;
use anyhow::Result;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const NO_REFERENCE: &str = "No reference number returned.";

impl BatchOrchestrator {
    /// Submits every eligible list in one processor run and settles each of
    /// them as Success or Failed.
    ///
    /// Concurrent calls are rejected with [`BatchOutcome::AlreadyRunning`].
    pub async fn process_batch(&self, mode: BatchMode) -> BatchReport {
        let Some(_guard) = self.gate.try_enter() else {
            return self.report_noop(
                mode,
                BatchOutcome::AlreadyRunning,
                "A batch is already running.",
            );
        };

        self.restore_states();

        let selected = self.select_lists(mode);
        if selected.is_empty() {
            let status = match mode {
                BatchMode::All => "No pending lists to process.",
                BatchMode::RetryFailedOnly => "No failed lists available to retry.",
            };
            return self.report_noop(mode, BatchOutcome::NothingToProcess, status);
        }

        let aslaas_updates = self.collect_aslaas_updates(&selected);
        let Some(dop_cheque_inputs) = self.collect_dop_cheque_inputs(&selected).await else {
            return self.report_noop(mode, BatchOutcome::Cancelled, "Processing cancelled.");
        };

        // Position p (1-based) in the payload is the list with ordinal positions[p - 1].
        let positions: Vec<usize> = selected.iter().map(BatchList::ordinal).collect();
        for &ordinal in &positions {
            self.transition(ordinal, BatchList::mark_processing);
        }

        self.observer.on_status(&match mode {
            BatchMode::All => format!("Running {} pending list(s)...", positions.len()),
            BatchMode::RetryFailedOnly => format!("Retrying {} failed list(s)...", positions.len()),
        });

        let request = BatchRequest {
            payload: codec::combined_payload(&selected),
            pay_mode: PaymentMode::Cash,
            aslaas_updates,
            dop_cheque_inputs,
        };
        self.telemetry.record_batch_started();
        info!(
            lists = positions.len(),
            payload = %request.payload,
            aslaas_updates = request.aslaas_updates.len(),
            cheques = request.dop_cheque_inputs.len(),
            "submitting batch"
        );

        let (result, output) = self.drive(&request, &positions).await;

        let report = match result {
            Ok(exit) if exit.is_success() => {
                self.fail_unsettled(&positions, NO_REFERENCE);
                self.flush_aslaas_updates(&request.aslaas_updates).await;
                self.completed_report(mode, &positions)
            }
            Ok(exit) => {
                let reason = codec::first_meaningful_line(output.iter().map(String::as_str));
                warn!(code = ?exit.code, %reason, "batch script failed");
                self.fail_unsettled(&positions, &reason);
                self.failed_report(mode, &positions, &reason)
            }
            Err(err) => {
                let message = format!("{err:#}");
                let reason = codec::first_meaningful_line(
                    output
                        .iter()
                        .map(String::as_str)
                        .chain(std::iter::once(message.as_str())),
                );
                warn!(error = %message, "batch script could not run");
                self.fail_unsettled(&positions, &reason);
                self.failed_report(mode, &positions, &reason)
            }
        };

        self.telemetry
            .record_outcomes(report.succeeded, report.failed);
        self.telemetry.log_snapshot();
        self.observer.on_status(&report.status);
        report
    }

    fn select_lists(&self, mode: BatchMode) -> Vec<BatchList> {
        self.lock_lists()
            .iter()
            .filter(|list| list.has_processable_entries())
            .filter(|list| match mode {
                BatchMode::All => list.state() != RunState::Success,
                BatchMode::RetryFailedOnly => list.state() == RunState::Failed,
            })
            .cloned()
            .collect()
    }

    /// Queued ASLAAS numbers for accounts that participate in `selected`.
    fn collect_aslaas_updates(&self, selected: &[BatchList]) -> Vec<AslaasUpdate> {
        let relevant: HashSet<&str> = selected
            .iter()
            .flat_map(|list| list.entries())
            .filter(|entry| entry.participates())
            .map(|entry| entry.account_no())
            .collect();

        let pending = self.lock_pending();
        pending
            .iter()
            .filter(|(account_no, _)| relevant.contains(account_no.as_str()))
            .map(|(account_no, aslaas)| AslaasUpdate {
                account_no: account_no.clone(),
                aslaas_no: normalize_aslaas(aslaas),
            })
            .collect()
    }

    /// Prompts for cheque details of every participating entry in selected DOP
    /// cheque lists. `None` when the operator cancels or leaves a field blank.
    async fn collect_dop_cheque_inputs(&self, selected: &[BatchList]) -> Option<Vec<DopChequeInput>> {
        let defaults = self.lock_cheque_defaults().clone();
        let mut last_cheque_no = defaults.cheque_no;
        let mut last_payment_account_no = defaults.payment_account_no;
        let mut inputs = Vec::new();

        for (index, list) in selected.iter().enumerate() {
            if list.mode() != PaymentMode::DopCheque {
                continue;
            }

            for entry in list.entries().iter().filter(|entry| entry.participates()) {
                let request = DopChequeRequest {
                    list_ordinal: list.ordinal(),
                    list_name: list.name(),
                    account_no: entry.account_no().to_owned(),
                    account_name: entry
                        .account()
                        .map(|account| account.account_name.clone())
                        .unwrap_or_default(),
                    installment: entry.installment(),
                    suggested_cheque_no: last_cheque_no.clone(),
                    suggested_payment_account_no: last_payment_account_no.clone(),
                };

                let response = self.auxiliary.request_dop_cheque(&request).await?;
                let cheque_no = response.cheque_no.trim().to_owned();
                let payment_account_no = response.payment_account_no.trim().to_owned();
                if cheque_no.is_empty() || payment_account_no.is_empty() {
                    return None;
                }

                last_cheque_no = cheque_no.clone();
                last_payment_account_no = payment_account_no.clone();
                inputs.push(DopChequeInput {
                    list_index: index + 1,
                    account_no: entry.account_no().to_owned(),
                    cheque_no,
                    payment_account_no,
                });
            }
        }

        if !inputs.is_empty() {
            let mut defaults = self.lock_cheque_defaults();
            defaults.cheque_no = last_cheque_no;
            defaults.payment_account_no = last_payment_account_no;
        }
        Some(inputs)
    }

    /// Runs the processor and consumes its output as it arrives. Returns the
    /// processor result together with every non-blank line seen.
    async fn drive(
        &self,
        request: &BatchRequest,
        positions: &[usize],
    ) -> (Result<ProcessExit>, Vec<String>) {
        let (tx, mut rx) = mpsc::channel(self.config.line_buffer());
        let progress = SubmissionProgress::new();
        let mut output = Vec::new();
        let mut run = self.processor.run(request, tx);
        let mut finished = None;

        loop {
            tokio::select! {
                line = rx.recv() => match line {
                    Some(line) => {
                        let line = line.trim();
                        if !line.is_empty() {
                            self.handle_line(line, positions, &progress);
                            output.push(line.to_owned());
                        }
                    }
                    None => break,
                },
                result = &mut run, if finished.is_none() => finished = Some(result),
            }
        }

        let result = match finished {
            Some(result) => result,
            None => run.await,
        };
        (result, output)
    }

    fn handle_line(&self, line: &str, positions: &[usize], progress: &SubmissionProgress) {
        self.telemetry.record_output_line();
        self.observer.on_progress(line);

        let ordinal_at = |position: usize| {
            position
                .checked_sub(1)
                .and_then(|index| positions.get(index))
                .copied()
        };

        match codec::classify_line(line) {
            ProgressEvent::ProcessingAnnounced(position) => {
                progress.announce(position);
                if let Some(ordinal) = ordinal_at(position) {
                    self.transition(ordinal, BatchList::mark_processing);
                }
            }
            ProgressEvent::Success(reference) => {
                match progress.current().and_then(ordinal_at) {
                    Some(ordinal) => {
                        self.transition(ordinal, |list| list.mark_success(&reference));
                    }
                    None => debug!(%reference, "reference before any list announcement ignored"),
                }
            }
            ProgressEvent::Failed(position, reason) => {
                if let Some(ordinal) = ordinal_at(position) {
                    self.transition(ordinal, |list| list.mark_failed(&reason));
                }
            }
            ProgressEvent::Opaque(_) => {}
        }
    }

    /// Applies `change` to list `ordinal`, persists, and notifies.
    fn transition(&self, ordinal: usize, change: impl FnOnce(&mut BatchList)) {
        let snapshot = {
            let mut lists = self.lock_lists();
            let Some(list) = lists.iter_mut().find(|list| list.ordinal() == ordinal) else {
                return;
            };
            change(list);
            list.clone()
        };
        self.persist(&snapshot);
        self.observer.on_list_state_changed(&snapshot);
    }

    fn fail_unsettled(&self, positions: &[usize], reason: &str) {
        for &ordinal in positions {
            let unsettled = self
                .list(ordinal)
                .map(|list| list.state() != RunState::Success)
                .unwrap_or(false);
            if unsettled {
                self.transition(ordinal, |list| list.mark_failed(reason));
            }
        }
    }

    /// Writes queued ASLAAS numbers back to the directory. They stay queued
    /// when the write fails.
    async fn flush_aslaas_updates(&self, updates: &[AslaasUpdate]) {
        if updates.is_empty() {
            return;
        }
        if let Err(err) = self.directory.save_aslaas_updates(updates).await {
            warn!(error = %format!("{err:#}"), "failed to save ASLAAS updates");
            return;
        }

        let mut pending = self.lock_pending();
        for update in updates {
            pending.remove(&update.account_no);
        }
        info!(count = updates.len(), "ASLAAS updates saved");
    }

    fn count_states(&self, positions: &[usize]) -> (usize, usize) {
        let lists = self.lock_lists();
        let selected = lists
            .iter()
            .filter(|list| positions.contains(&list.ordinal()));
        selected.fold((0, 0), |(ok, failed), list| match list.state() {
            RunState::Success => (ok + 1, failed),
            RunState::Failed => (ok, failed + 1),
            _ => (ok, failed),
        })
    }

    fn completed_report(&self, mode: BatchMode, positions: &[usize]) -> BatchReport {
        let (succeeded, failed) = self.count_states(positions);
        let (outcome, status) = if failed == 0 {
            (
                BatchOutcome::Completed,
                format!(
                    "Completed. {succeeded}/{} list(s) processed successfully.",
                    positions.len()
                ),
            )
        } else {
            (
                BatchOutcome::CompletedWithFailures,
                format!("Completed with issues. Success: {succeeded}, Failed: {failed}."),
            )
        };
        BatchReport {
            mode,
            outcome,
            selected: positions.len(),
            succeeded,
            failed,
            status,
        }
    }

    fn failed_report(&self, mode: BatchMode, positions: &[usize], reason: &str) -> BatchReport {
        let (succeeded, failed) = self.count_states(positions);
        BatchReport {
            mode,
            outcome: BatchOutcome::ProcessFailed,
            selected: positions.len(),
            succeeded,
            failed,
            status: format!("List processing failed: {reason}"),
        }
    }

    fn report_noop(&self, mode: BatchMode, outcome: BatchOutcome, status: &str) -> BatchReport {
        self.observer.on_status(status);
        BatchReport::noop(mode, outcome, status)
    }
}
