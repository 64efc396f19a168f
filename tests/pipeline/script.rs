use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rdbatch::{BatchConfig, BatchMode, BatchOutcome, RunState, ScriptProcessor};

use crate::support::helpers::Workspace;

fn write_script(dir: &Path, body: &str) -> Result<()> {
    std::fs::write(dir.join("ScheduleArguments.py"), format!("#!/bin/sh\n{body}\n"))?;
    Ok(())
}

fn shell_config(workspace: &Workspace) -> Result<BatchConfig> {
    BatchConfig::builder()
        .base_dir(workspace.path())
        .interpreter("/bin/sh")
        .build()
}

#[tokio::test]
async fn script_output_settles_lists() -> Result<()> {
    let workspace = Workspace::new()?;
    write_script(
        workspace.path(),
        r#"printf '%s\n' "$@" > args.txt
echo "PROCESSING LIST #1"
echo "Reference: SH001"
echo "PROCESSING LIST #2"
echo "Error processing list #2: Balance low"
exit 0"#,
    )?;
    let config = shell_config(&workspace)?;
    let processor = Arc::new(ScriptProcessor::from_config(&config));
    let session = workspace.session_with(config, processor)?;
    session.add_entry(1, "020001", 1).await?;
    let second = session.add_list();
    session.add_entry(second, "020003", 1).await?;

    let report = session.process_batch(BatchMode::All).await;
    assert_eq!(report.outcome, BatchOutcome::CompletedWithFailures);
    assert_eq!(session.list(1).unwrap().reference_number(), Some("SH001"));
    assert_eq!(
        session.list(2).unwrap().failure_reason(),
        Some("No reference number returned.")
    );

    let args = std::fs::read_to_string(workspace.path().join("args.txt"))?;
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(
        args,
        vec!["--bulk", "cash:[020001], cash:[020003]", "--pay-mode", "cash"]
    );
    Ok(())
}

#[tokio::test]
async fn stderr_explains_a_crashed_script() -> Result<()> {
    let workspace = Workspace::new()?;
    write_script(workspace.path(), "echo 'Traceback: boom' >&2\nexit 3")?;
    let config = shell_config(&workspace)?;
    let processor = Arc::new(ScriptProcessor::from_config(&config));
    let session = workspace.session_with(config, processor)?;
    session.add_entry(1, "020002", 1).await?;

    let report = session.process_batch(BatchMode::All).await;
    assert_eq!(report.outcome, BatchOutcome::ProcessFailed);
    let list = session.list(1).unwrap();
    assert_eq!(list.state(), RunState::Failed);
    assert_eq!(list.failure_reason(), Some("Traceback: boom"));
    Ok(())
}

#[tokio::test]
async fn missing_script_fails_every_selected_list() -> Result<()> {
    let workspace = Workspace::new()?;
    let config = shell_config(&workspace)?;
    let processor = Arc::new(ScriptProcessor::from_config(&config));
    let session = workspace.session_with(config, processor)?;
    session.add_entry(1, "020002", 1).await?;

    let report = session.process_batch(BatchMode::All).await;
    assert_eq!(report.outcome, BatchOutcome::ProcessFailed);
    let reason = session.list(1).unwrap().failure_reason().unwrap().to_owned();
    assert!(reason.starts_with("Script not found:"), "{reason}");
    Ok(())
}
