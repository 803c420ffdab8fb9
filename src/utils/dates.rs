//! Time injection so recency scoring stays deterministic in tests

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in unix seconds. Components that score recency or stamp
/// rows take a `Clock` at construction instead of reading the system time.
#[derive(Clone)]
pub struct Clock {
    source: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl Clock {
    /// Wall-clock time
    pub fn system() -> Self {
        Clock {
            source: Arc::new(unix_now),
        }
    }

    /// A clock frozen at `ts`, for tests
    pub fn fixed(ts: i64) -> Self {
        Clock {
            source: Arc::new(move || ts),
        }
    }

    pub fn now(&self) -> i64 {
        (self.source)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::system()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock").finish_non_exhaustive()
    }
}

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Modification time of filesystem metadata as unix seconds
pub fn mtime_of(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
