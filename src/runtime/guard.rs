use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Admits at most one batch at a time. Contenders are rejected, never queued.
#[derive(Debug, Default)]
pub struct BatchGate {
    busy: AtomicBool,
}

impl BatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate, or returns `None` when a batch is already in flight.
    /// The claim is released when the guard drops.
    pub fn try_enter(self: &Arc<Self>) -> Option<BatchGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(BatchGuard {
            gate: Arc::clone(self),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct BatchGuard {
    gate: Arc<BatchGate>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let gate = Arc::new(BatchGate::new());
        let guard = gate.try_enter().expect("first claim");
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());

        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
    }
}
