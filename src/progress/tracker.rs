//! Shared progress accumulator

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Point-in-time copy of the progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes accounted for so far
    pub bytes_done: u64,
    /// Bytes expected, if a pre-scan ran
    pub total_bytes: Option<u64>,
    /// Files accounted for so far
    pub files_done: u64,
    /// Files expected, if a pre-scan ran
    pub total_files: Option<u64>,
}

impl ProgressSnapshot {
    /// Completion percentage, `None` when indeterminate
    pub fn percent(&self) -> Option<f64> {
        let ratio = |done: u64, total: u64| (done as f64 / total as f64 * 100.0).min(100.0);

        match (self.total_bytes, self.total_files) {
            (None, _) => None,
            (Some(0), None | Some(0)) => Some(100.0),
            // Only empty files: fall back to counting files.
            (Some(0), Some(files)) => Some(ratio(self.files_done, files)),
            (Some(bytes), _) => Some(ratio(self.bytes_done, bytes)),
        }
    }
}

/// Byte/file counters written by the worker and read by UI threads.
///
/// One mutex guards all counters so a reader never sees bytes and files
/// from different moments.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<ProgressSnapshot>,
}

impl ProgressTracker {
    /// Create a tracker with no known total
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        // Counters stay meaningful even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget all counts and totals
    pub fn reset(&self) {
        *self.lock() = ProgressSnapshot::default();
    }

    /// Record totals discovered by a pre-scan
    pub fn set_totals(&self, total_bytes: u64, total_files: u64) {
        let mut state = self.lock();
        state.total_bytes = Some(total_bytes);
        state.total_files = Some(total_files);
    }

    /// Account for one finished file of `bytes` bytes
    pub fn add_file(&self, bytes: u64) {
        let mut state = self.lock();
        state.bytes_done = state.bytes_done.saturating_add(bytes);
        state.files_done += 1;
    }

    /// Current counters
    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.lock()
    }

    /// Current percentage, `None` when indeterminate
    pub fn percent(&self) -> Option<f64> {
        self.snapshot().percent()
    }
}
