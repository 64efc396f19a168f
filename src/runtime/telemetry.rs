use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Session-wide counters for batch runs.
#[derive(Default, Debug)]
pub struct RunTelemetry {
    batches_started: AtomicU64,
    lists_succeeded: AtomicU64,
    lists_failed: AtomicU64,
    lists_reconciled: AtomicU64,
    output_lines: AtomicU64,
    persistence_errors: AtomicU64,
}

impl RunTelemetry {
    pub fn record_batch_started(&self) {
        self.batches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcomes(&self, succeeded: usize, failed: usize) {
        self.lists_succeeded
            .fetch_add(succeeded as u64, Ordering::Relaxed);
        self.lists_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn record_reconciled(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.lists_reconciled
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_output_line(&self) {
        self.output_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunTelemetrySnapshot {
        RunTelemetrySnapshot {
            batches_started: self.batches_started.load(Ordering::Relaxed),
            lists_succeeded: self.lists_succeeded.load(Ordering::Relaxed),
            lists_failed: self.lists_failed.load(Ordering::Relaxed),
            lists_reconciled: self.lists_reconciled.load(Ordering::Relaxed),
            output_lines: self.output_lines.load(Ordering::Relaxed),
            persistence_errors: self.persistence_errors.load(Ordering::Relaxed),
        }
    }

    /// Emits the current counters as one structured event.
    pub fn log_snapshot(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "rdbatch::metrics",
            batches = snapshot.batches_started,
            succeeded = snapshot.lists_succeeded,
            failed = snapshot.lists_failed,
            reconciled = snapshot.lists_reconciled,
            output_lines = snapshot.output_lines,
            persistence_errors = snapshot.persistence_errors,
            "batch telemetry snapshot"
        );
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RunTelemetrySnapshot {
    pub batches_started: u64,
    pub lists_succeeded: u64,
    pub lists_failed: u64,
    pub lists_reconciled: u64,
    pub output_lines: u64,
    pub persistence_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_records_counters() {
        let telemetry = RunTelemetry::default();
        telemetry.record_batch_started();
        telemetry.record_outcomes(2, 1);
        telemetry.record_reconciled(0);
        telemetry.record_reconciled(3);
        telemetry.record_output_line();
        telemetry.record_persistence_error();

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.batches_started, 1);
        assert_eq!(snapshot.lists_succeeded, 2);
        assert_eq!(snapshot.lists_failed, 1);
        assert_eq!(snapshot.lists_reconciled, 3);
        assert_eq!(snapshot.output_lines, 1);
        assert_eq!(snapshot.persistence_errors, 1);
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        RunTelemetry::default().log_snapshot();
    }
}
