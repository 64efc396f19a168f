use std::sync::Arc;

use anyhow::Result;
use rdbatch::{BatchMode, BatchOutcome, PaymentMode, RunState};

use crate::support::{fake_processor::ReplayProcessor, helpers::Workspace};

#[tokio::test]
async fn mixed_outcomes_then_retry() -> Result<()> {
    let workspace = Workspace::new()?;
    let processor = Arc::new(
        ReplayProcessor::new()
            .then(
                &[
                    "Logging in",
                    "PROCESSING LIST #1",
                    "Reference: C9001",
                    "PROCESSING LIST #2",
                    "Error processing list #2: Portal timeout",
                ],
                0,
            )
            .then(&["PROCESSING LIST #1", "Reference: C9002"], 0),
    );
    let session = workspace.session(processor.clone())?;
    session.add_entry(1, "020001", 2).await?;
    let second = session.add_list();
    session.add_entry(second, "020003", 1).await?;
    session.add_entry(second, "020002", 1).await?;

    let report = session.process_batch(BatchMode::All).await;
    assert_eq!(report.outcome, BatchOutcome::CompletedWithFailures);
    assert_eq!(report.status, "Completed with issues. Success: 1, Failed: 1.");
    assert_eq!(
        processor.requests()[0].payload,
        "cash:[020001_2], cash:[020003, 020002]"
    );
    assert_eq!(
        session.list(2).unwrap().failure_reason(),
        Some("No reference number returned.")
    );

    let retry = session.process_batch(BatchMode::RetryFailedOnly).await;
    assert_eq!(retry.outcome, BatchOutcome::Completed);
    assert_eq!(processor.requests()[1].payload, "cash:[020003, 020002]");
    assert_eq!(session.reference_numbers(), vec!["C9001", "C9002"]);
    assert!(!session.has_failed_lists());
    Ok(())
}

#[tokio::test]
async fn aslaas_updates_reach_the_account_file_after_success() -> Result<()> {
    let workspace = Workspace::new()?;
    let processor = Arc::new(ReplayProcessor::new().then(
        &["PROCESSING LIST #1", "Reference: C7001"],
        0,
    ));
    let session = workspace.session(processor.clone())?;
    session.add_entry(1, "020004", 1).await?;
    session.set_mode(1, PaymentMode::NonDopCheque)?;

    let report = session.process_batch(BatchMode::All).await;
    assert_eq!(report.outcome, BatchOutcome::Completed);

    let request = &processor.requests()[0];
    assert_eq!(request.payload, "non_dop_cheque:[020004]");
    assert_eq!(request.aslaas_updates.len(), 1);
    assert_eq!(request.aslaas_updates[0].aslaas_no, "APPLIED");

    let saved = std::fs::read_to_string(workspace.accounts_file())?;
    let records: Vec<rdbatch::AccountRecord> = serde_json::from_str(&saved)?;
    let devi = records
        .iter()
        .find(|record| record.account_no == "020004")
        .unwrap();
    assert_eq!(devi.aslaas_no, "APPLIED");
    assert!(session.pending_aslaas().is_empty());
    Ok(())
}

#[tokio::test]
async fn script_failure_keeps_aslaas_queue() -> Result<()> {
    let workspace = Workspace::new()?;
    let processor = Arc::new(ReplayProcessor::new().then(
        &["PROCESSING LIST #1", "Chrome driver crashed"],
        2,
    ));
    let session = workspace.session(processor)?;
    session.add_entry(1, "020004", 1).await?;

    let report = session.process_batch(BatchMode::All).await;
    assert_eq!(report.outcome, BatchOutcome::ProcessFailed);
    assert_eq!(report.status, "List processing failed: PROCESSING LIST #1");

    let list = session.list(1).unwrap();
    assert_eq!(list.state(), RunState::Failed);
    assert_eq!(session.pending_aslaas().len(), 1);
    Ok(())
}
