//! Cooperative cancellation for long-running scans

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Explicit cancellation token passed into `scan` and `vet`.
///
/// Cancellation is cooperative: the producer stops enumerating, in-flight
/// workers drain, and the writer commits everything already accepted before
/// the operation returns a partial report.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
