//! External batch processor seam and the script-backed implementation.
//!
//! The orchestrator depends only on the processor's line-oriented output and
//! its exit code. [`ScriptProcessor`] runs the payment script through an
//! interpreter and forwards stdout and stderr line by line.

use super::types::DopChequeInput;
use crate::model::{AslaasUpdate, PaymentMode};
use crate::runtime::config::BatchConfig;
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Everything one processor invocation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// `", "`-joined `{mode}:[tokens]` segments in submission order.
    pub payload: String,
    /// Global pay-mode flag; per-list modes travel inside the payload.
    pub pay_mode: PaymentMode,
    pub aslaas_updates: Vec<AslaasUpdate>,
    pub dop_cheque_inputs: Vec<DopChequeInput>,
}

impl BatchRequest {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            pay_mode: PaymentMode::Cash,
            aslaas_updates: Vec::new(),
            dop_cheque_inputs: Vec::new(),
        }
    }

    /// Script arguments following the script path. Optional JSON arguments are
    /// omitted when they would be empty.
    pub fn script_args(&self) -> Result<Vec<String>> {
        let mut args = vec![
            "--bulk".to_owned(),
            self.payload.clone(),
            "--pay-mode".to_owned(),
            self.pay_mode.token().to_owned(),
        ];

        let cheques: Vec<_> = self
            .dop_cheque_inputs
            .iter()
            .filter(|input| {
                input.list_index > 0
                    && !input.account_no.trim().is_empty()
                    && !input.cheque_no.trim().is_empty()
                    && !input.payment_account_no.trim().is_empty()
            })
            .collect();
        if !cheques.is_empty() {
            args.push("--dop-cheque-data".to_owned());
            args.push(serde_json::to_string(&cheques).context("failed to encode cheque data")?);
        }

        let updates: Vec<_> = self
            .aslaas_updates
            .iter()
            .filter(|update| !update.account_no.trim().is_empty())
            .collect();
        if !updates.is_empty() {
            args.push("--aslaas-updates".to_owned());
            args.push(serde_json::to_string(&updates).context("failed to encode ASLAAS updates")?);
        }

        Ok(args)
    }
}

/// Exit status of a processor run. `code` is `None` when the process was
/// terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn with_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one batch. Every output line must be sent through `lines` before the
/// returned future resolves; an `Err` means the processor could not run at all.
pub trait BatchProcessor: Send + Sync {
    fn run<'a>(
        &'a self,
        request: &'a BatchRequest,
        lines: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<ProcessExit>>;
}

#[derive(Debug, Clone)]
pub struct ScriptProcessor {
    interpreter: PathBuf,
    script: PathBuf,
}

impl BatchProcessor for ScriptProcessor {
    fn run<'a>(
        &'a self,
        request: &'a BatchRequest,
        lines: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<ProcessExit>> {
        Box::pin(self.run_script(request, lines))
    }
}

impl ScriptProcessor {
    pub fn new(interpreter: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.interpreter(), config.script_path())
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Output of `<interpreter> --version`; errors when the interpreter is
    /// missing or exits non-zero.
    pub async fn interpreter_version(&self) -> Result<String> {
        let mut command = Command::new(&self.interpreter);
        command.arg("--version");
        apply_runtime_environment(&mut command);

        let output = command
            .output()
            .await
            .with_context(|| format!("interpreter {} not found", self.interpreter.display()))?;
        if !output.status.success() {
            bail!(
                "interpreter {} exited with {}",
                self.interpreter.display(),
                output.status
            );
        }

        let mut version = String::from_utf8_lossy(&output.stdout).into_owned();
        version.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(version.trim().to_owned())
    }

    fn command(&self, request: &BatchRequest) -> Result<Command> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-u")
            .arg(&self.script)
            .args(request.script_args()?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.script.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        apply_runtime_environment(&mut command);
        Ok(command)
    }

    async fn run_script(
        &self,
        request: &BatchRequest,
        lines: mpsc::Sender<String>,
    ) -> Result<ProcessExit> {
        if !self.script.is_file() {
            bail!("Script not found: {}", self.script.display());
        }

        let mut child = self.command(request)?.spawn().with_context(|| {
            format!(
                "Error executing script: failed to launch {}",
                self.interpreter.display()
            )
        })?;
        info!(
            interpreter = %self.interpreter.display(),
            script = %self.script.display(),
            pid = child.id(),
            "batch script started"
        );

        let stdout = child.stdout.take().context("script stdout was not captured")?;
        let stderr = child.stderr.take().context("script stderr was not captured")?;
        let stdout_task = tokio::spawn(forward_lines(stdout, lines.clone(), "stdout"));
        let stderr_task = tokio::spawn(forward_lines(stderr, lines, "stderr"));

        let status = child
            .wait()
            .await
            .context("failed to wait for the batch script")?;

        for task in [stdout_task, stderr_task] {
            if let Err(err) = task.await {
                warn!(error = %err, "output forwarder task failed");
            }
        }

        debug!(code = ?status.code(), "batch script exited");
        Ok(ProcessExit {
            code: status.code(),
        })
    }
}

fn apply_runtime_environment(command: &mut Command) {
    command
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONUTF8", "1")
        .env("PYTHONIOENCODING", "utf-8");
}

async fn forward_lines<R>(reader: R, lines: mpsc::Sender<String>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                if lines.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(stream, error = %err, "failed to read script output");
                break;
            }
        }
    }
}
