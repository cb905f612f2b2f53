//! File operations used by the transfer engine
//!
//! Buffered copy with optional timestamp/permission preservation, moves
//! with a cross-device fallback, and a few directory helpers.

use crate::error::{IoResultExt, Result, TreeSyncError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Options for file copy operations
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Buffer size for buffered operations
    pub buffer_size: usize,
    /// Preserve file permissions
    pub preserve_permissions: bool,
    /// Preserve modification and access time
    pub preserve_timestamps: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024 * 1024, // 1MB
            preserve_permissions: true,
            preserve_timestamps: true,
        }
    }
}

/// How a move was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    /// Same-volume rename
    Rename,
    /// Copy followed by removal of the source
    CopyAndDelete,
}

/// Buffered file copier
#[derive(Debug, Clone, Default)]
pub struct FileCopier {
    options: CopyOptions,
}

impl FileCopier {
    /// Create a new file copier with the given options
    pub fn new(options: CopyOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    /// Copy `source` over `dest`, returning the number of bytes written
    pub fn copy(&self, source: &Path, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }

        // A read-only destination cannot be truncated in place.
        if let Ok(meta) = std::fs::metadata(dest) {
            if meta.permissions().readonly() {
                let mut perms = meta.permissions();
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                std::fs::set_permissions(dest, perms).with_path(dest)?;
            }
        }

        let bytes_copied = self.copy_buffered(source, dest)?;
        self.preserve_attributes(source, dest)?;

        Ok(bytes_copied)
    }

    /// Move `source` to `dest`, falling back to copy + delete across volumes
    pub fn move_file(&self, source: &Path, dest: &Path) -> Result<MoveMethod> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }

        match std::fs::rename(source, dest) {
            Ok(()) => Ok(MoveMethod::Rename),
            Err(err) => {
                tracing::debug!(
                    "rename {} -> {} failed ({}), copying instead",
                    source.display(),
                    dest.display(),
                    err
                );
                let copied = self.copy(source, dest)?;
                let expected = std::fs::metadata(source).with_path(source)?.len();
                if copied != expected {
                    return Err(TreeSyncError::integrity_mismatch(
                        dest,
                        format!("{} bytes", expected),
                        format!("{} bytes", copied),
                    ));
                }
                remove_file(source)?;
                Ok(MoveMethod::CopyAndDelete)
            }
        }
    }

    /// Buffered copy
    fn copy_buffered(&self, source: &Path, dest: &Path) -> Result<u64> {
        let src_file = File::open(source).with_path(source)?;
        let dst_file = File::create(dest).with_path(dest)?;

        let mut reader = BufReader::with_capacity(self.options.buffer_size, src_file);
        let mut writer = BufWriter::with_capacity(self.options.buffer_size, dst_file);

        let bytes_copied = std::io::copy(&mut reader, &mut writer)
            .map_err(|e| TreeSyncError::io(source, e))?;

        writer.flush().with_path(dest)?;

        Ok(bytes_copied)
    }

    /// Preserve file attributes (permissions and timestamps)
    pub fn preserve_attributes(&self, source: &Path, dest: &Path) -> Result<()> {
        let metadata = std::fs::metadata(source).with_path(source)?;

        // Times first: a read-only permission set afterwards must not block it.
        if self.options.preserve_timestamps {
            if let Ok(mtime) = metadata.modified() {
                let atime = metadata.accessed().unwrap_or(mtime);
                filetime::set_file_times(
                    dest,
                    filetime::FileTime::from_system_time(atime),
                    filetime::FileTime::from_system_time(mtime),
                )
                .with_path(dest)?;
            }
        }

        if self.options.preserve_permissions {
            std::fs::set_permissions(dest, metadata.permissions()).with_path(dest)?;
        }

        Ok(())
    }
}

/// Remove a single file, clearing a read-only flag if needed
pub fn remove_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            let mut perms = std::fs::metadata(path).with_path(path)?.permissions();
            if !perms.readonly() {
                return Err(TreeSyncError::io(path, err));
            }
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            std::fs::set_permissions(path, perms).with_path(path)?;
            std::fs::remove_file(path).with_path(path)
        }
        Err(err) => Err(TreeSyncError::io(path, err)),
    }
}

/// Create `path` and its parents; returns true if the directory was new
pub fn ensure_dir(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(path).with_path(path)?;
    Ok(true)
}

/// Remove empty directories below `root`, deepest first. `root` is kept.
pub fn prune_empty_dirs(root: &Path) -> Result<usize> {
    let mut removed = 0;

    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_empty = std::fs::read_dir(entry.path())
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if is_empty {
            std::fs::remove_dir(entry.path()).with_path(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// Closest ancestor of `path` (itself included) that exists
pub fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors().find(|p| p.exists()).map(Path::to_path_buf)
}

/// Get available space at a path
pub fn available_space(path: &Path) -> Result<u64> {
    use sysinfo::Disks;

    let probe = nearest_existing_ancestor(path)
        .ok_or_else(|| TreeSyncError::NotFound(path.to_path_buf()))?;
    let probe = probe.canonicalize().unwrap_or(probe);

    let disks = Disks::new_with_refreshed_list();

    let mut best_match = None;
    let mut best_len = 0;

    for disk in disks.iter() {
        let mount = disk.mount_point();
        let mount_len = mount.as_os_str().len();
        if probe.starts_with(mount) && mount_len >= best_len {
            best_match = Some(disk.available_space());
            best_len = mount_len;
        }
    }

    best_match.ok_or_else(|| TreeSyncError::NotFound(path.to_path_buf()))
}
