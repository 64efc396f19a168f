use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::BoxFuture;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rdbatch::codec::{normalize_account_input, normalize_installment_input};
use rdbatch::{
    AslaasRequest, AuxiliaryInput, BatchConfig, BatchList, BatchMode, BatchOrchestrator,
    DopChequeRequest, DopChequeResponse, FileStateStore, ListObserver, MemoryDirectory,
    OrchestratorParams, PaymentMode, ScriptProcessor, StaticAuxiliaryInput,
};

const DEFAULT_LOG_DIRECTIVE: &str = "warn";
const ACCOUNTS_FILE: &str = "accounts.json";

#[derive(Parser, Debug)]
#[command(name = "rdbatch", version, about = "Batch recurring-deposit payment lists")]
struct Cli {
    /// Account directory (JSON array); defaults to accounts.json in the base directory
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Decline every prompt instead of reading answers from stdin
    #[arg(long)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every list with its state
    Show,
    /// Append an empty list
    NewList,
    /// Add an account to a list
    Add {
        list: usize,
        account: String,
        #[arg(long, default_value = "1")]
        installment: String,
    },
    /// Add several accounts at one installment until the list is full
    AddMany {
        list: usize,
        accounts: Vec<String>,
    },
    /// Remove an account from a list
    Remove { list: usize, account: String },
    /// Remove every account from a list
    Clear { list: usize },
    /// Change a list's payment mode
    Mode { list: usize, mode: ModeArg },
    /// Drop every list and every saved outcome
    DeleteAll,
    /// Submit eligible lists to the payment script
    Process {
        /// Only resubmit lists whose last run failed
        #[arg(long)]
        retry_failed: bool,
    },
    /// Print reference numbers of successful lists
    References,
    /// Verify the interpreter and script are usable
    Check,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Cash,
    DopCheque,
    NonDopCheque,
}

impl From<ModeArg> for PaymentMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Cash => PaymentMode::Cash,
            ModeArg::DopCheque => PaymentMode::DopCheque,
            ModeArg::NonDopCheque => PaymentMode::NonDopCheque,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_cli_tracing();
    let cli = Cli::parse();
    let config = BatchConfig::from_env()?;

    if let Command::Check = cli.command {
        return check(&config).await;
    }

    let bar = build_spinner();
    let orchestrator = open_session(&cli, config, bar.clone()).await?;

    let mutated = match &cli.command {
        Command::Show => {
            print_lists(&bar, &orchestrator.lists());
            false
        }
        Command::NewList => {
            let ordinal = orchestrator.add_list();
            say(&bar, format!("List {ordinal} added."));
            true
        }
        Command::Add {
            list,
            account,
            installment,
        } => {
            let account = normalize_account_input(account);
            let installment = normalize_installment_input(installment);
            // Rejections are already reported through the observer.
            orchestrator
                .add_entry(*list, &account, installment)
                .await
                .is_ok()
        }
        Command::AddMany { list, accounts } => {
            let accounts: Vec<String> = accounts
                .iter()
                .map(|account| normalize_account_input(account))
                .collect();
            let summary = orchestrator.add_accounts(*list, &accounts).await?;
            say(
                &bar,
                format!(
                    "Added {}; rejected {}; not attempted {}.",
                    summary.added.len(),
                    summary.rejected.len(),
                    summary.not_attempted.len()
                ),
            );
            for (account, reason) in &summary.rejected {
                say(&bar, format!("  {account}: {reason}"));
            }
            true
        }
        Command::Remove { list, account } => {
            if !orchestrator.remove_entry(*list, &normalize_account_input(account))? {
                bail!("{} is not in list {list}", account.trim());
            }
            true
        }
        Command::Clear { list } => {
            orchestrator.clear_list(*list)?;
            true
        }
        Command::Mode { list, mode } => {
            orchestrator.set_mode(*list, (*mode).into())?;
            true
        }
        Command::DeleteAll => {
            orchestrator.delete_all_lists()?;
            true
        }
        Command::Process { retry_failed } => {
            let mode = if *retry_failed {
                BatchMode::RetryFailedOnly
            } else {
                BatchMode::All
            };
            bar.enable_steady_tick(Duration::from_millis(120));
            let report = orchestrator.process_batch(mode).await;
            bar.finish_and_clear();
            print_lists(&bar, &orchestrator.lists());
            println!("{report}");
            !report.outcome.is_noop()
        }
        Command::References => {
            for reference in orchestrator.reference_numbers() {
                println!("{reference}");
            }
            false
        }
        Command::Check => false,
    };

    if mutated {
        orchestrator.save_lot()?;
    }
    Ok(())
}

fn init_cli_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    rdbatch::init_tracing();
}

fn build_spinner() -> ProgressBar {
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr_with_hz(12));
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {wide_msg}")
        .expect("valid spinner template");
    bar.set_style(style);
    bar
}

/// Builds the orchestrator and restores the saved lot, if any.
async fn open_session(
    cli: &Cli,
    config: BatchConfig,
    bar: ProgressBar,
) -> Result<BatchOrchestrator> {
    let accounts = cli
        .accounts
        .clone()
        .unwrap_or_else(|| config.base_dir().join(ACCOUNTS_FILE));
    let directory = MemoryDirectory::load_json(&accounts)?;
    let store = FileStateStore::load(config.state_file());
    let processor = ScriptProcessor::from_config(&config);
    let auxiliary: Arc<dyn AuxiliaryInput> = if cli.non_interactive {
        Arc::new(StaticAuxiliaryInput::declining())
    } else {
        Arc::new(StdinPrompt { bar: bar.clone() })
    };
    let lot_exists = config.lot_file().is_file();

    let orchestrator = BatchOrchestrator::new(OrchestratorParams {
        config,
        directory: Arc::new(directory),
        processor: Arc::new(processor),
        store: Arc::new(store),
        auxiliary,
        observer: Arc::new(SpinnerObserver { bar }),
    });

    if lot_exists {
        orchestrator.reload_lot().await?;
    } else {
        orchestrator.restore_states();
    }
    Ok(orchestrator)
}

async fn check(config: &BatchConfig) -> Result<()> {
    let processor = ScriptProcessor::from_config(config);
    let version = processor.interpreter_version().await?;
    println!("interpreter: {} ({version})", processor.interpreter().display());
    if !processor.script().is_file() {
        bail!("Script not found: {}", processor.script().display());
    }
    println!("script: {}", processor.script().display());
    println!("state file: {}", config.state_file().display());
    println!("reference log: {}", config.reference_log().display());
    Ok(())
}

/// Prints above the spinner; works when the spinner is hidden.
fn say(bar: &ProgressBar, message: impl AsRef<str>) {
    bar.suspend(|| println!("{}", message.as_ref()));
}

fn print_lists(bar: &ProgressBar, lists: &[BatchList]) {
    for list in lists {
        let mut line = format!(
            "{} [{}] {} entries, Rs. {} ({})",
            list.name(),
            list.mode(),
            list.entries().len(),
            list.total(),
            list.state()
        );
        if let Some(reference) = list.reference_number() {
            line.push_str(&format!(" ref {reference}"));
        }
        if let Some(reason) = list.failure_reason() {
            line.push_str(&format!(": {reason}"));
        }
        say(bar, line);
        for entry in list.entries() {
            say(
                bar,
                format!(
                    "    {} x{} = Rs. {}",
                    entry.account_no(),
                    entry.installment(),
                    entry.total()
                ),
            );
        }
    }
}

struct SpinnerObserver {
    bar: ProgressBar,
}

impl ListObserver for SpinnerObserver {
    fn on_list_state_changed(&self, list: &BatchList) {
        self.bar.set_message(format!("{}: {}", list.name(), list.state()));
    }

    fn on_progress(&self, line: &str) {
        self.bar.set_message(line.to_owned());
    }

    fn on_status(&self, status: &str) {
        say(&self.bar, status);
    }
}

/// Reads prompt answers from stdin on the blocking pool.
struct StdinPrompt {
    bar: ProgressBar,
}

impl StdinPrompt {
    async fn ask(&self, question: String) -> Option<String> {
        let bar = self.bar.clone();
        let answer = tokio::task::spawn_blocking(move || {
            bar.suspend(|| -> io::Result<Option<String>> {
                let mut stdout = io::stdout();
                write!(stdout, "{question}")?;
                stdout.flush()?;
                let mut line = String::new();
                let read = io::stdin().lock().read_line(&mut line)?;
                Ok((read > 0).then(|| line.trim().to_owned()))
            })
        })
        .await
        .context("prompt task failed");

        match answer {
            Ok(Ok(answer)) => answer,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "failed to read prompt answer");
                None
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to read prompt answer");
                None
            }
        }
    }
}

impl AuxiliaryInput for StdinPrompt {
    fn request_aslaas<'a>(&'a self, request: &'a AslaasRequest) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let answer = self
                .ask(format!(
                    "ASLAAS number for {} {} [{}] (blank cancels): ",
                    request.account_no, request.account_name, request.suggested
                ))
                .await?;
            (!answer.is_empty()).then_some(answer)
        })
    }

    fn request_dop_cheque<'a>(
        &'a self,
        request: &'a DopChequeRequest,
    ) -> BoxFuture<'a, Option<DopChequeResponse>> {
        Box::pin(async move {
            let cheque_no = self
                .ask(format!(
                    "{} / {} x{}: cheque number [{}]: ",
                    request.list_name,
                    request.account_no,
                    request.installment,
                    request.suggested_cheque_no
                ))
                .await?;
            let payment_account_no = self
                .ask(format!(
                    "payment account number [{}]: ",
                    request.suggested_payment_account_no
                ))
                .await?;

            let or_suggested = |answer: String, suggested: &str| {
                if answer.is_empty() {
                    suggested.to_owned()
                } else {
                    answer
                }
            };
            Some(DopChequeResponse {
                cheque_no: or_suggested(cheque_no, &request.suggested_cheque_no),
                payment_account_no: or_suggested(
                    payment_account_no,
                    &request.suggested_payment_account_no,
                ),
            })
        })
    }
}
