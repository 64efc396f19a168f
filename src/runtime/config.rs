use crate::model::AMOUNT_CEILING;
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_DUE_SOON_DAYS: u32 = 30;
const DEFAULT_LINE_BUFFER: usize = 256;
const MAX_DUE_SOON_DAYS: u32 = 366;

const BASE_DIR_NAME: &str = "DOPAgent";
const STATE_FILE: &str = "State/list_processing_state.json";
const LOT_FILE: &str = "State/list_lot_snapshot.json";
const REFERENCE_LOG: &str = "Reports/references/payment_references.txt";
const SCRIPT_FILE: &str = "ScheduleArguments.py";

/// Runtime configuration for batch processing.
///
/// Construct through [`BatchConfig::builder`], [`BatchConfig::new`], or
/// [`BatchConfig::from_env`]; every path validates before it is handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    base_dir: PathBuf,
    interpreter: PathBuf,
    script_path: PathBuf,
    state_file: PathBuf,
    reference_log: PathBuf,
    lot_file: PathBuf,
    amount_ceiling: Decimal,
    due_soon_days: u32,
    line_buffer: usize,
}

pub struct BatchConfigParams {
    pub base_dir: PathBuf,
    pub interpreter: PathBuf,
    pub script_path: PathBuf,
    pub state_file: PathBuf,
    pub reference_log: PathBuf,
    pub lot_file: PathBuf,
    pub amount_ceiling: Decimal,
    pub due_soon_days: u32,
    pub line_buffer: usize,
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    pub fn new(params: BatchConfigParams) -> Result<Self> {
        let BatchConfigParams {
            base_dir,
            interpreter,
            script_path,
            state_file,
            reference_log,
            lot_file,
            amount_ceiling,
            due_soon_days,
            line_buffer,
        } = params;

        let config = Self {
            base_dir,
            interpreter,
            script_path,
            state_file,
            reference_log,
            lot_file,
            amount_ceiling,
            due_soon_days,
            line_buffer,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads `RDBATCH_*` variables, falling back to the default layout under
    /// the base directory for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder()
            .amount_ceiling(parse_env_with_default("RDBATCH_AMOUNT_CEILING", AMOUNT_CEILING)?)
            .due_soon_days(parse_env_with_default(
                "RDBATCH_DUE_SOON_DAYS",
                DEFAULT_DUE_SOON_DAYS,
            )?)
            .line_buffer(parse_env_with_default(
                "RDBATCH_LINE_BUFFER",
                DEFAULT_LINE_BUFFER,
            )?);

        if let Some(path) = env_path("RDBATCH_BASE_DIR")? {
            builder = builder.base_dir(path);
        }
        if let Some(path) = env_path("RDBATCH_INTERPRETER")? {
            builder = builder.interpreter(path);
        }
        if let Some(path) = env_path("RDBATCH_SCRIPT")? {
            builder = builder.script_path(path);
        }
        if let Some(path) = env_path("RDBATCH_STATE_FILE")? {
            builder = builder.state_file(path);
        }
        if let Some(path) = env_path("RDBATCH_REFERENCE_LOG")? {
            builder = builder.reference_log(path);
        }
        if let Some(path) = env_path("RDBATCH_LOT_FILE")? {
            builder = builder.lot_file(path);
        }

        builder.build()
    }

    /// Root directory holding the script, state, and reports.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Interpreter used to launch the batch script.
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    pub fn reference_log(&self) -> &Path {
        &self.reference_log
    }

    pub fn lot_file(&self) -> &Path {
        &self.lot_file
    }

    /// Ceiling applied to cash and non-DOP cheque lists.
    pub fn amount_ceiling(&self) -> Decimal {
        self.amount_ceiling
    }

    /// Window used to flag accounts whose next installment is close.
    pub fn due_soon_days(&self) -> u32 {
        self.due_soon_days
    }

    /// Capacity of the channel carrying processor output lines.
    pub fn line_buffer(&self) -> usize {
        self.line_buffer
    }

    pub fn validate(&self) -> Result<()> {
        ensure_path(&self.base_dir, "base_dir")?;
        ensure_path(&self.interpreter, "interpreter")?;
        ensure_path(&self.script_path, "script_path")?;
        ensure_path(&self.state_file, "state_file")?;
        ensure_path(&self.reference_log, "reference_log")?;
        ensure_path(&self.lot_file, "lot_file")?;

        if self.amount_ceiling <= Decimal::ZERO {
            bail!("amount_ceiling must be greater than 0");
        }

        if self.due_soon_days > MAX_DUE_SOON_DAYS {
            bail!("due_soon_days must be at most {MAX_DUE_SOON_DAYS}");
        }

        if self.line_buffer == 0 {
            bail!("line_buffer must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct BatchConfigBuilder {
    base_dir: Option<PathBuf>,
    interpreter: Option<PathBuf>,
    script_path: Option<PathBuf>,
    state_file: Option<PathBuf>,
    reference_log: Option<PathBuf>,
    lot_file: Option<PathBuf>,
    amount_ceiling: Option<Decimal>,
    due_soon_days: Option<u32>,
    line_buffer: Option<usize>,
}

impl BatchConfigBuilder {
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn script_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_path = Some(path.into());
        self
    }

    pub fn state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    pub fn reference_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_log = Some(path.into());
        self
    }

    pub fn lot_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lot_file = Some(path.into());
        self
    }

    pub fn amount_ceiling(mut self, ceiling: Decimal) -> Self {
        self.amount_ceiling = Some(ceiling);
        self
    }

    pub fn due_soon_days(mut self, days: u32) -> Self {
        self.due_soon_days = Some(days);
        self
    }

    pub fn line_buffer(mut self, capacity: usize) -> Self {
        self.line_buffer = Some(capacity);
        self
    }

    pub fn build(self) -> Result<BatchConfig> {
        let base_dir = self.base_dir.unwrap_or_else(default_base_dir);
        let params = BatchConfigParams {
            interpreter: self
                .interpreter
                .unwrap_or_else(|| default_interpreter(&base_dir)),
            script_path: self
                .script_path
                .unwrap_or_else(|| base_dir.join(SCRIPT_FILE)),
            state_file: self.state_file.unwrap_or_else(|| base_dir.join(STATE_FILE)),
            reference_log: self
                .reference_log
                .unwrap_or_else(|| base_dir.join(REFERENCE_LOG)),
            lot_file: self.lot_file.unwrap_or_else(|| base_dir.join(LOT_FILE)),
            amount_ceiling: self.amount_ceiling.unwrap_or(AMOUNT_CEILING),
            due_soon_days: self.due_soon_days.unwrap_or(DEFAULT_DUE_SOON_DAYS),
            line_buffer: self.line_buffer.unwrap_or(DEFAULT_LINE_BUFFER),
            base_dir,
        };

        BatchConfig::new(params)
    }
}

/// `~/Documents/DOPAgent`, or `./DOPAgent` when no home directory is known.
pub fn default_base_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join("Documents"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(BASE_DIR_NAME)
}

/// Prefers a `.venv` interpreter inside `base_dir`, else the platform default.
pub fn default_interpreter(base_dir: &Path) -> PathBuf {
    let venv = base_dir.join(".venv");
    if venv.is_dir() {
        let (bin, primary, fallback) = if cfg!(windows) {
            ("Scripts", "python.exe", "python")
        } else {
            ("bin", "python3", "python")
        };
        let primary = venv.join(bin).join(primary);
        return if primary.exists() {
            primary
        } else {
            venv.join(bin).join(fallback)
        };
    }

    PathBuf::from(if cfg!(windows) { "python" } else { "python3" })
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

fn env_path(key: &str) -> Result<Option<PathBuf>> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(PathBuf::from(value.trim()))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

fn ensure_path(path: &Path, field: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}
