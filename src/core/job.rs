//! Transfer job definition

use crate::config::{HashAlgorithm, JobOptions};
use crate::core::ConflictPolicy;
use crate::error::{IoResultExt, Result};
use crate::fs::EntryFilter;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// What a run does with the source tree
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Copy files; source remains unchanged
    #[default]
    Copy,
    /// Move files; source files are removed after transfer
    Move,
    /// Copy, resolving unattended conflicts by modification time
    Sync,
    /// Sync, then delete destination files absent from the source
    Mirror,
}

impl TransferMode {
    /// Whether files leave the source tree
    pub fn is_move(&self) -> bool {
        matches!(self, Self::Move)
    }

    /// Whether conflict resolution must not wait on a caller
    pub fn is_unattended(&self) -> bool {
        matches!(self, Self::Sync | Self::Mirror)
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "Copy"),
            Self::Move => write!(f, "Move"),
            Self::Sync => write!(f, "Sync"),
            Self::Mirror => write!(f, "Mirror"),
        }
    }
}

/// Immutable input to one engine run.
///
/// Paths are made absolute at construction; whether they exist is checked
/// when the job runs.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Root source directory
    pub source: PathBuf,
    /// Root destination directory
    pub destination: PathBuf,
    /// Operation mode
    pub mode: TransferMode,
    /// How to handle existing destination files
    pub conflict_policy: ConflictPolicy,
    /// Which files take part
    pub filter: EntryFilter,
    /// Copy modification/access times
    pub preserve_timestamps: bool,
    /// Copy permission bits / read-only attribute
    pub preserve_permissions: bool,
    /// Create the destination directory if missing
    pub create_destination: bool,
    /// Hash-compare each copy against its source
    pub verify_copy: bool,
    /// Algorithm used when `verify_copy` is set
    pub verify_algorithm: HashAlgorithm,
    /// Descend into symlinked directories and copy symlink targets
    pub follow_symlinks: bool,
    /// Pre-scan the source to report percentages
    pub compute_progress: bool,
    /// Report what would happen without touching the filesystem
    pub dry_run: bool,
    /// Files larger than this are skipped with a warning
    pub max_file_size: Option<u64>,
    /// Remove source directories emptied by a MOVE
    pub prune_empty_dirs: bool,
    /// Copy buffer size in bytes
    pub buffer_size: usize,
}

impl TransferJob {
    /// Build a job with default options
    pub fn new(source: impl AsRef<Path>, destination: impl AsRef<Path>, mode: TransferMode) -> Result<Self> {
        Self::with_options(
            source,
            destination,
            JobOptions {
                mode,
                ..Default::default()
            },
        )
    }

    /// Build a job from a full option set, compiling its filter
    pub fn with_options(
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        options: JobOptions,
    ) -> Result<Self> {
        let source = absolute(source.as_ref())?;
        let destination = absolute(destination.as_ref())?;
        let filter = EntryFilter::new(options.filter)?;

        Ok(Self {
            source,
            destination,
            mode: options.mode,
            conflict_policy: options.conflict_policy,
            filter,
            preserve_timestamps: options.preserve_timestamps,
            preserve_permissions: options.preserve_permissions,
            create_destination: options.create_destination,
            verify_copy: options.verify_copy,
            verify_algorithm: options.verify_algorithm,
            follow_symlinks: options.follow_symlinks,
            compute_progress: options.compute_progress,
            dry_run: options.dry_run,
            max_file_size: options.max_file_size,
            prune_empty_dirs: options.prune_empty_dirs,
            buffer_size: options.buffer_size.max(4096),
        })
    }

    /// Conflict policy in effect for this job's mode.
    ///
    /// A mirror must converge on the source's name set, so RENAME becomes
    /// OVERWRITE there.
    pub fn effective_policy(&self) -> ConflictPolicy {
        match (self.mode, self.conflict_policy) {
            (TransferMode::Mirror, ConflictPolicy::Rename) => ConflictPolicy::Overwrite,
            (mode, policy) if mode.is_unattended() => policy.unattended(),
            (_, policy) => policy,
        }
    }

    /// Option set equivalent to this job (for presets)
    pub fn options(&self) -> JobOptions {
        JobOptions {
            mode: self.mode,
            conflict_policy: self.conflict_policy,
            filter: self.filter.config().clone(),
            preserve_timestamps: self.preserve_timestamps,
            preserve_permissions: self.preserve_permissions,
            create_destination: self.create_destination,
            verify_copy: self.verify_copy,
            verify_algorithm: self.verify_algorithm,
            follow_symlinks: self.follow_symlinks,
            compute_progress: self.compute_progress,
            dry_run: self.dry_run,
            max_file_size: self.max_file_size,
            prune_empty_dirs: self.prune_empty_dirs,
            buffer_size: self.buffer_size,
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_path(path).map(|p| normalize_lexically(&p))
}

/// Fold `.` and `..` components without touching the filesystem.
///
/// `..` at the root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
