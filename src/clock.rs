//! Time sources.
//!
//! Durations are measured on tokio's monotonic clock so tests can pause and
//! advance time deterministically. Wall-clock time is only used to compare
//! against token expiry claims.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Current wall-clock instant.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// A monotonic stopwatch.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whole milliseconds elapsed since [`start`](Self::start).
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
