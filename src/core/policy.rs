//! Conflict resolution
//!
//! When a destination file already exists the engine asks a
//! [`ConflictPolicy`] what to do. Resolution is a pure function of the two
//! metadata snapshots; RENAME never looks at metadata at all.

use crate::error::{Result, TreeSyncError};
use crate::fs::CatalogEntry;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Highest numeric suffix tried when looking for a free name
pub const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Strategy for an already-existing destination entry
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the destination
    #[default]
    Skip,
    /// Always replace the destination
    Overwrite,
    /// Copy next to the destination under a new name
    Rename,
    /// Replace only if the source is strictly newer
    Newer,
    /// Replace only if the source is strictly larger
    Larger,
    /// Defer to a caller-supplied decision (NEWER when unattended)
    Ask,
}

/// Outcome of resolving a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Leave the destination alone
    Skip,
    /// Write over the destination
    Copy,
    /// Write to a fresh, non-colliding name
    Rename,
}

/// Caller-supplied decision for [`ConflictPolicy::Ask`]
pub trait ConflictDecider: Send + Sync {
    /// Decide what to do with `source` given the existing `dest`
    fn decide(&self, source: &CatalogEntry, dest: &CatalogEntry) -> Resolution;
}

impl<F> ConflictDecider for F
where
    F: Fn(&CatalogEntry, &CatalogEntry) -> Resolution + Send + Sync,
{
    fn decide(&self, source: &CatalogEntry, dest: &CatalogEntry) -> Resolution {
        self(source, dest)
    }
}

impl ConflictPolicy {
    /// Resolve without a decider; ASK behaves like NEWER
    pub fn resolve(&self, source: &CatalogEntry, dest: &CatalogEntry) -> Resolution {
        match self {
            Self::Skip => Resolution::Skip,
            Self::Overwrite => Resolution::Copy,
            Self::Rename => Resolution::Rename,
            Self::Newer | Self::Ask => {
                match (source.modified, dest.modified) {
                    (Some(src), Some(dst)) if src > dst => Resolution::Copy,
                    // A destination with no readable mtime loses to one that has it.
                    (Some(_), None) => Resolution::Copy,
                    _ => Resolution::Skip,
                }
            }
            Self::Larger => {
                if source.size > dest.size {
                    Resolution::Copy
                } else {
                    Resolution::Skip
                }
            }
        }
    }

    /// Resolve, consulting `decider` for ASK when one is available
    pub fn resolve_with(
        &self,
        source: &CatalogEntry,
        dest: &CatalogEntry,
        decider: Option<&dyn ConflictDecider>,
    ) -> Resolution {
        match (self, decider) {
            (Self::Ask, Some(decider)) => decider.decide(source, dest),
            _ => self.resolve(source, dest),
        }
    }

    /// Policy used in unattended contexts (SYNC, MIRROR)
    pub fn unattended(self) -> Self {
        match self {
            Self::Ask => Self::Newer,
            other => other,
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::Newer => "newer",
            Self::Larger => "larger",
            Self::Ask => "ask",
        };
        f.write_str(name)
    }
}

/// Find `stem_<n>.ext` (n = 1..=9999) that does not exist yet
pub fn unique_destination(path: &Path) -> Result<PathBuf> {
    unique_destination_within(path, MAX_RENAME_ATTEMPTS)
}

fn unique_destination_within(path: &Path, max_attempts: u32) -> Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for n in 1..=max_attempts {
        let candidate = parent.join(format!("{}_{}{}", stem, n, ext));
        if std::fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }

    Err(TreeSyncError::RenameExhausted {
        path: path.to_path_buf(),
        attempts: max_attempts,
    })
}
