pub mod codec;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod runtime;
pub mod store;

pub use model::{
    AccountDirectory, AccountRecord, AslaasUpdate, BatchList, EntryRejection, EntryStatus,
    ListEntry, MemoryDirectory, PaymentMode, RunState, AMOUNT_CEILING,
};
pub use orchestrator::{
    AddedEntry, AslaasRequest, AuxiliaryInput, BatchMode, BatchOrchestrator, BatchOutcome,
    BatchProcessor, BatchReport, BatchRequest, BulkAddSummary, DopChequeInput, DopChequeRequest,
    DopChequeResponse, ListObserver, LotReloadSummary, LotSnapshot, OrchestratorParams,
    ProcessExit, ScriptProcessor, StaticAuxiliaryInput, TracingObserver,
};
pub use reconcile::{ReferenceHit, ReferenceIndex, ReferenceLogEntry};
pub use runtime::config::{BatchConfig, BatchConfigBuilder, BatchConfigParams};
pub use runtime::telemetry::{init_tracing, RunTelemetry, RunTelemetrySnapshot};
pub use store::{FileStateStore, MemoryStateStore, RecordStatus, RunStateRecord, StateStore};
