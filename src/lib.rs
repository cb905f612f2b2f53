//! # treesync - directory tree copy, move, sync and mirror
//!
//! treesync applies a source directory to a destination directory in one of
//! four modes, honoring a per-file filter and a policy for files that already
//! exist at the destination.
//!
//! ## Features
//!
//! - **Four modes**: COPY, MOVE, SYNC (newer wins) and MIRROR (sync plus deletion)
//! - **Entry filtering**: globs, extensions, size bounds, hidden/system/read-only gates
//! - **Conflict policies**: skip, overwrite, rename, newer, larger, or ask a callback
//! - **Dry runs**: full report, no filesystem changes
//! - **Progress**: optional pre-scan for percentages, cooperative cancellation
//! - **Integrity Verification**: XXHash3, XXHash64, BLAKE3, SHA-256
//!
//! ## Quick Start
//!
//! ```no_run
//! use treesync::core::{TransferEngine, TransferJob, TransferMode};
//!
//! let job = TransferJob::new("/photos", "/backup/photos", TransferMode::Sync).unwrap();
//! let report = TransferEngine::new().run(&job, &mut |msg: &str, pct: Option<f64>| {
//!     println!("{msg} {pct:?}");
//! });
//!
//! println!("Copied {} files ({} bytes)", report.files_copied, report.bytes_copied);
//! ```
//!
//! ## Background Runs
//!
//! ```no_run
//! use treesync::config::JobOptions;
//! use treesync::core::{spawn, TransferJob, TransferMode};
//! use treesync::fs::FilterConfig;
//!
//! let options = JobOptions {
//!     mode: TransferMode::Mirror,
//!     filter: FilterConfig {
//!         extensions: vec![".jpg".into(), ".png".into()],
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! let job = TransferJob::with_options("/src", "/dst", options).unwrap();
//!
//! let handle = spawn(job, |_, _| {}).unwrap();
//! println!("{:?}", handle.progress().percent());
//! let report = handle.wait().unwrap();
//! report.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod hash;
pub mod progress;

// Re-export commonly used types
pub use config::{HashAlgorithm, JobOptions};
pub use core::{ConflictPolicy, TransferEngine, TransferJob, TransferMode, TransferReport};
pub use error::{Result, TreeSyncError};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use treesync::prelude::*;
    //! ```

    pub use crate::config::{HashAlgorithm, JobOptions};
    pub use crate::core::{
        spawn, ConflictDecider, ConflictPolicy, Resolution, TransferEngine, TransferHandle, TransferJob,
        TransferMode, TransferReport,
    };
    pub use crate::error::{Result, TreeSyncError};
    pub use crate::fs::{stat, CatalogEntry, EntryFilter, FilterConfig, FilterMode};
    pub use crate::hash::{hash_file, verify_files_match, HashResult};
    pub use crate::progress::{ProgressReporter, ProgressTracker};
}
