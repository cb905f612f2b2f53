//! Path catalog: point-in-time metadata snapshots
//!
//! `stat` never fails. Anything the OS refuses to describe comes back as a
//! non-existent entry with every flag cleared, so callers can treat
//! "cannot stat" the same as "does not exist".

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

#[cfg(windows)]
const FILE_ATTRIBUTE_READONLY: u32 = 0x1;
#[cfg(windows)]
const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
#[cfg(windows)]
const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;

/// Read-only snapshot of a single filesystem path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Absolute path that was queried
    pub path: PathBuf,
    /// Whether the path could be stat'd at all
    pub exists: bool,
    /// Regular file
    pub is_file: bool,
    /// Directory
    pub is_dir: bool,
    /// Current process may read it
    pub readable: bool,
    /// Current process may write it
    pub writable: bool,
    /// Size in bytes; only meaningful when `is_file`
    pub size: u64,
    /// Hidden (dot-file on Unix, attribute on Windows)
    pub hidden: bool,
    /// System attribute (Windows only)
    pub system: bool,
    /// Read-only attribute / no write permission bits
    pub readonly: bool,
    /// Last modification time
    pub modified: Option<SystemTime>,
    /// Creation time, where the platform records one
    pub created: Option<SystemTime>,
}

impl CatalogEntry {
    /// Entry for a path that does not usefully exist
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            is_file: false,
            is_dir: false,
            readable: false,
            writable: false,
            size: 0,
            hidden: false,
            system: false,
            readonly: false,
            modified: None,
            created: None,
        }
    }

    fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let is_file = metadata.is_file();
        let (hidden, system, readonly) = attribute_flags(path, metadata);

        Self {
            path: path.to_path_buf(),
            exists: true,
            is_file,
            is_dir: metadata.is_dir(),
            readable: can_read(path),
            writable: can_write(path, metadata),
            size: if is_file { metadata.len() } else { 0 },
            hidden,
            system,
            readonly,
            modified: metadata.modified().ok(),
            created: metadata.created().ok(),
        }
    }

    /// Base file name, if it is valid UTF-8
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Extension including the leading dot (e.g. `.txt`)
    pub fn dotted_extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
    }
}

/// Query the filesystem for `path`, following symlinks
pub fn stat(path: &Path) -> CatalogEntry {
    match std::fs::metadata(path) {
        Ok(metadata) => CatalogEntry::from_metadata(path, &metadata),
        Err(_) => CatalogEntry::missing(path),
    }
}

/// Query the filesystem for `path` without following a final symlink
pub fn lstat(path: &Path) -> CatalogEntry {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) => CatalogEntry::from_metadata(path, &metadata),
        Err(_) => CatalogEntry::missing(path),
    }
}

/// Total bytes and file count of all regular files under `path`.
///
/// Unreadable entries are skipped; a partial answer beats no answer.
pub fn directory_size(path: &Path) -> (u64, u64) {
    let mut total_size = 0u64;
    let mut file_count = 0u64;

    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(metadata) = entry.metadata() {
                total_size += metadata.len();
                file_count += 1;
            }
        }
    }

    (total_size, file_count)
}

#[cfg(windows)]
fn attribute_flags(_path: &Path, metadata: &Metadata) -> (bool, bool, bool) {
    use std::os::windows::fs::MetadataExt;

    let attrs = metadata.file_attributes();
    (
        attrs & FILE_ATTRIBUTE_HIDDEN != 0,
        attrs & FILE_ATTRIBUTE_SYSTEM != 0,
        attrs & FILE_ATTRIBUTE_READONLY != 0,
    )
}

#[cfg(not(windows))]
fn attribute_flags(path: &Path, metadata: &Metadata) -> (bool, bool, bool) {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);
    (hidden, false, metadata.permissions().readonly())
}

#[cfg(unix)]
fn can_read(path: &Path) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::R_OK).is_ok()
}

#[cfg(not(unix))]
fn can_read(path: &Path) -> bool {
    if path.is_dir() {
        std::fs::read_dir(path).is_ok()
    } else {
        std::fs::File::open(path).is_ok()
    }
}

#[cfg(unix)]
fn can_write(path: &Path, _metadata: &Metadata) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn can_write(_path: &Path, metadata: &Metadata) -> bool {
    !metadata.permissions().readonly()
}
