use crate::model::BatchList;
use tracing::{debug, info};

/// Receives list and run notifications. Called without any orchestrator
/// lock held, always from the task that made the change.
pub trait ListObserver: Send + Sync {
    fn on_list_state_changed(&self, _list: &BatchList) {}

    fn on_progress(&self, _line: &str) {}

    fn on_status(&self, _status: &str) {}
}

/// Logs every notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ListObserver for TracingObserver {
    fn on_list_state_changed(&self, list: &BatchList) {
        info!(
            list = list.ordinal(),
            name = %list.name(),
            state = %list.state(),
            reference = list.reference_number().unwrap_or_default(),
            reason = list.failure_reason().unwrap_or_default(),
            "list state changed"
        );
    }

    fn on_progress(&self, line: &str) {
        debug!(target: "rdbatch::script", "{line}");
    }

    fn on_status(&self, status: &str) {
        info!(status, "batch status");
    }
}
