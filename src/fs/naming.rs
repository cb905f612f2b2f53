//! Filename grammar checks and sanitization
//!
//! Rules follow the host OS by default. Windows rules can be requested
//! explicitly, which is useful when preparing names for removable media
//! formatted with FAT/NTFS.

use crate::error::{Result, TreeSyncError};
use std::path::{Component, Path};

/// Longest permitted single path component, in characters
pub const MAX_NAME_LEN: usize = 255;

const WINDOWS_RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const POSIX_RESERVED_CHARS: &[char] = &['/', '\0'];

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Filename grammar for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRules {
    reserved_chars: &'static [char],
    reserved_names: &'static [&'static str],
    reject_control_chars: bool,
    reject_trailing_dot_space: bool,
}

impl NameRules {
    /// Windows (NTFS/FAT) grammar
    pub const fn windows() -> Self {
        Self {
            reserved_chars: WINDOWS_RESERVED_CHARS,
            reserved_names: WINDOWS_RESERVED_NAMES,
            reject_control_chars: true,
            reject_trailing_dot_space: true,
        }
    }

    /// POSIX grammar: only `/` and NUL are forbidden
    pub const fn posix() -> Self {
        Self {
            reserved_chars: POSIX_RESERVED_CHARS,
            reserved_names: &[],
            reject_control_chars: false,
            reject_trailing_dot_space: false,
        }
    }

    /// Grammar of the platform we are running on
    pub const fn host() -> Self {
        if cfg!(windows) {
            Self::windows()
        } else {
            Self::posix()
        }
    }

    fn is_invalid_char(&self, c: char) -> bool {
        self.reserved_chars.contains(&c) || (self.reject_control_chars && (c as u32) < 32)
    }

    fn is_reserved_name(&self, name: &str) -> bool {
        let stem = name.split('.').next().unwrap_or(name);
        self.reserved_names
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    }

    /// Check a single path component
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(TreeSyncError::invalid_name(name, "name is empty"));
        }

        if name.chars().count() > MAX_NAME_LEN {
            return Err(TreeSyncError::invalid_name(
                name,
                format!("longer than {} characters", MAX_NAME_LEN),
            ));
        }

        if let Some(c) = name.chars().find(|c| self.is_invalid_char(*c)) {
            return Err(TreeSyncError::invalid_name(
                name,
                format!("contains reserved character {:?}", c),
            ));
        }

        if self.reject_trailing_dot_space && (name.ends_with('.') || name.ends_with(' ')) {
            return Err(TreeSyncError::invalid_name(name, "ends with a period or space"));
        }

        if self.is_reserved_name(name) {
            return Err(TreeSyncError::invalid_name(name, "reserved device name"));
        }

        Ok(())
    }

    /// Check every normal component of `path`.
    ///
    /// Roots, prefixes (`C:`) and `.`/`..` are structural and not checked.
    pub fn validate_path(&self, path: &Path) -> Result<()> {
        for component in path.components() {
            if let Component::Normal(part) = component {
                let name = part.to_str().ok_or_else(|| TreeSyncError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "component is not valid UTF-8".to_string(),
                })?;
                self.validate(name).map_err(|e| TreeSyncError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Rewrite `name` into something `validate` accepts
    pub fn sanitize(&self, name: &str, replacement: char) -> String {
        let mut cleaned: String = name
            .chars()
            .map(|c| if self.is_invalid_char(c) { replacement } else { c })
            .collect();

        if self.is_reserved_name(&cleaned) {
            cleaned.insert(0, replacement);
        }

        cleaned = truncate_preserving_extension(&cleaned, MAX_NAME_LEN);

        if self.reject_trailing_dot_space {
            let trimmed_len = cleaned.trim_end_matches(['.', ' ']).len();
            cleaned.truncate(trimmed_len);
        }

        if cleaned.trim().is_empty() {
            cleaned = replacement.to_string();
        }

        // Trimming can expose a device name ("CON   " -> "CON").
        if self.is_reserved_name(&cleaned) {
            cleaned.insert(0, replacement);
        }

        cleaned
    }
}

impl Default for NameRules {
    fn default() -> Self {
        Self::host()
    }
}

/// Validate a file name against the host rules
pub fn validate_filename(name: &str) -> Result<()> {
    NameRules::host().validate(name)
}

/// Validate every component of a path against the host rules
pub fn validate_path(path: &Path) -> Result<()> {
    NameRules::host().validate_path(path)
}

/// Sanitize a file name for the host, replacing bad characters with `_`
pub fn sanitize_filename(name: &str) -> String {
    NameRules::host().sanitize(name, '_')
}

fn truncate_preserving_extension(name: &str, limit: usize) -> String {
    let len = name.chars().count();
    if len <= limit {
        return name.to_string();
    }

    // Keep the suffix only when it is a real, reasonably short extension.
    let ext = match name.rfind('.') {
        Some(idx) if idx > 0 && name[idx..].chars().count() < limit / 2 => &name[idx..],
        _ => "",
    };
    let keep = limit - ext.chars().count();
    let stem: String = name.chars().take(keep).collect();
    format!("{}{}", stem, ext)
}
