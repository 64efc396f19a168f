use std::sync::Arc;

use anyhow::Result;
use rdbatch::{BatchMode, BatchOutcome, RunState};

use crate::support::{fake_processor::ReplayProcessor, helpers::Workspace};

#[tokio::test]
async fn settled_lists_are_not_resubmitted_after_restart() -> Result<()> {
    let workspace = Workspace::new()?;
    let first = workspace.session(Arc::new(ReplayProcessor::new().then(
        &["PROCESSING LIST #1", "Reference: R100"],
        0,
    )))?;
    first.add_entry(1, "020001", 1).await?;
    first.add_entry(1, "020002", 1).await?;
    first.process_batch(BatchMode::All).await;
    first.save_lot()?;
    drop(first);

    let processor = Arc::new(ReplayProcessor::new());
    let second = workspace.session(processor.clone())?;
    let summary = second.reload_lot().await?;
    assert_eq!(summary.message(), "Reloaded 1 list(s) from saved lot.");

    let list = second.list(1).unwrap();
    assert_eq!(list.state(), RunState::Success);
    assert_eq!(list.reference_number(), Some("R100"));

    let report = second.process_batch(BatchMode::All).await;
    assert_eq!(report.outcome, BatchOutcome::NothingToProcess);
    assert!(processor.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn state_file_alone_restores_matching_lists() -> Result<()> {
    let workspace = Workspace::new()?;
    let first = workspace.session(Arc::new(ReplayProcessor::new().then(
        &["List #1: Account closed"],
        0,
    )))?;
    first.add_entry(1, "020003", 1).await?;
    first.process_batch(BatchMode::All).await;
    drop(first);

    let second = workspace.session(Arc::new(ReplayProcessor::new()))?;
    second.add_entry(1, "020003", 1).await?;
    assert_eq!(second.restore_states(), vec![1]);
    let list = second.list(1).unwrap();
    assert_eq!(list.state(), RunState::Failed);
    assert_eq!(list.failure_reason(), Some("No reference number returned."));
    Ok(())
}

#[tokio::test]
async fn reference_log_wins_over_a_lost_state_file() -> Result<()> {
    let workspace = Workspace::new()?;
    let config = workspace.config()?;
    let log = config.reference_log();
    std::fs::create_dir_all(log.parent().unwrap())?;
    std::fs::write(
        log,
        concat!(
            "================================================================================\n",
            "Timestamp: 2026-02-01 09:00:00\n",
            "List #: 1\n",
            "Reference Number: OLD1\n",
            "Accounts: [020001, 020002]\n",
            "================================================================================\n",
            "Timestamp: 2026-02-03 16:30:00\n",
            "List #: 4\n",
            "Reference Number: NEW2\n",
            "Accounts: [020001, 020002]\n",
        ),
    )?;

    let processor = Arc::new(ReplayProcessor::new());
    let session = workspace.session_with(config.clone(), processor.clone())?;
    session.add_entry(1, "020001", 1).await?;
    session.add_entry(1, "020002", 1).await?;

    let report = session.process_batch(BatchMode::All).await;
    assert_eq!(report.outcome, BatchOutcome::NothingToProcess);
    assert_eq!(session.list(1).unwrap().reference_number(), Some("NEW2"));
    assert!(processor.requests().is_empty());

    let persisted = rdbatch::store::load_records(config.state_file());
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].reference_number, "NEW2");
    Ok(())
}
