//! Transfer core
//!
//! Job description, conflict policy, the engine that executes a job, and
//! the report it produces.

mod engine;
mod job;
mod policy;
mod report;

pub use engine::*;
pub use job::*;
pub use policy::*;
pub use report::*;
