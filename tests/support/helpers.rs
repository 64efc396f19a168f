use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use rdbatch::{
    AccountRecord, BatchConfig, BatchOrchestrator, BatchProcessor, FileStateStore,
    MemoryDirectory, OrchestratorParams, StaticAuxiliaryInput, TracingObserver,
};
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// A throwaway base directory with an account file on disk.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        init_tracing();
        let workspace = Self {
            dir: tempfile::tempdir()?,
        };
        let accounts = vec![
            AccountRecord::new("020001", dec!(5000))
                .with_name("Asha")
                .with_aslaas("A1"),
            AccountRecord::new("020002", dec!(2500))
                .with_name("Bala")
                .with_aslaas("A2"),
            AccountRecord::new("020003", dec!(12000))
                .with_name("Chitra")
                .with_aslaas("A3"),
            AccountRecord::new("020004", dec!(800)).with_name("Devi"),
        ];
        std::fs::write(
            workspace.accounts_file(),
            serde_json::to_vec_pretty(&accounts)?,
        )?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn accounts_file(&self) -> PathBuf {
        self.path().join("accounts.json")
    }

    pub fn config(&self) -> Result<BatchConfig> {
        BatchConfig::builder()
            .base_dir(self.path())
            .interpreter("python3")
            .build()
    }

    /// A fresh session over the files in this workspace, as after a restart.
    pub fn session(&self, processor: Arc<dyn BatchProcessor>) -> Result<BatchOrchestrator> {
        self.session_with(self.config()?, processor)
    }

    pub fn session_with(
        &self,
        config: BatchConfig,
        processor: Arc<dyn BatchProcessor>,
    ) -> Result<BatchOrchestrator> {
        let store = FileStateStore::load(config.state_file());
        Ok(BatchOrchestrator::new(OrchestratorParams {
            config,
            directory: Arc::new(MemoryDirectory::load_json(self.accounts_file())?),
            processor,
            store: Arc::new(store),
            auxiliary: Arc::new(StaticAuxiliaryInput::accepting(None)),
            observer: Arc::new(TracingObserver),
        }))
    }
}
