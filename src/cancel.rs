//! Cooperative cancellation shared by the walker and the download manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A clonable stop signal. Checked at loop boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that running work stop at its next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
