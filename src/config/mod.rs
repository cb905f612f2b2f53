//! Configuration module for treesync
//!
//! Per-run options, JSON presets, and the command line that builds them.

mod settings;

pub use settings::*;
