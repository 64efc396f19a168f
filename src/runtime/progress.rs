use std::sync::atomic::{AtomicUsize, Ordering};

const UNANNOUNCED: usize = 0;

/// Tracks the 1-based submission position most recently announced by the
/// processor. References are attributed to this position.
#[derive(Debug, Default)]
pub struct SubmissionProgress {
    current: AtomicUsize,
}

impl SubmissionProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn announce(&self, position: usize) {
        self.current.store(position, Ordering::SeqCst);
    }

    /// `None` until the first announcement.
    pub fn current(&self) -> Option<usize> {
        match self.current.load(Ordering::SeqCst) {
            UNANNOUNCED => None,
            position => Some(position),
        }
    }
}
