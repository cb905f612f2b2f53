//! Progress reporting module
//!
//! `ProgressTracker` is the thread-safe byte accumulator the engine writes
//! and any UI may poll; `ProgressReporter` renders updates as a terminal bar.

mod reporter;
mod tracker;

pub use reporter::*;
pub use tracker::*;

/// Progress callback: human-readable message and a percentage, or `None`
/// when the total is unknown.
pub type ProgressFn<'a> = dyn FnMut(&str, Option<f64>) + 'a;
