//! File system module
//!
//! Metadata snapshots, filename rules, entry filtering and the low-level
//! copy/move/delete operations used by the transfer engine.

pub mod catalog;
pub mod filter;
pub mod naming;
mod operations;

pub use catalog::{directory_size, lstat, stat, CatalogEntry};
pub use filter::{EntryFilter, FilterConfig, FilterMode};
pub use naming::{sanitize_filename, validate_filename, validate_path, NameRules, MAX_NAME_LEN};
pub use operations::*;
