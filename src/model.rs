//! Domain model for recurring-deposit payment lists: account records pulled
//! from the directory, payment modes, list entries, and the batch lists that
//! carry the run-state machine.

pub mod account;
pub mod directory;
pub mod entry;
pub mod list;
pub mod mode;

pub use account::{normalize_aslaas, AccountRecord, AslaasUpdate, DEFAULT_ASLAAS};
pub use directory::{AccountDirectory, MemoryDirectory};
pub use entry::{EntryStatus, ListEntry};
pub use list::{BatchList, EntryRejection, RunState, AMOUNT_CEILING};
pub use mode::PaymentMode;
