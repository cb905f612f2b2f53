//! Entry filtering
//!
//! A filter is declared as a serializable [`FilterConfig`] and compiled once
//! into an [`EntryFilter`]. Evaluation is a pure function of the entry's
//! attributes and the configuration.

use crate::error::{Result, TreeSyncError};
use crate::fs::CatalogEntry;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// What a pattern/extension match means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Only entries matching a pattern or extension pass
    #[default]
    Include,
    /// Entries matching a pattern or extension are rejected
    Exclude,
}

/// Declarative filter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Shell globs matched against the base file name
    pub patterns: Vec<String>,
    /// Extensions with leading dot, compared case-insensitively
    pub extensions: Vec<String>,
    /// Smallest accepted size in bytes
    pub min_size: Option<u64>,
    /// Largest accepted size in bytes
    pub max_size: Option<u64>,
    /// Accept hidden entries
    pub include_hidden: bool,
    /// Accept system entries
    pub include_system: bool,
    /// Accept read-only entries
    pub include_readonly: bool,
    /// Include or exclude semantics for patterns/extensions
    pub mode: FilterMode,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            extensions: Vec::new(),
            min_size: None,
            max_size: None,
            include_hidden: true,
            include_system: true,
            include_readonly: true,
            mode: FilterMode::Include,
        }
    }
}

/// Compiled, immutable entry filter
#[derive(Debug, Clone)]
pub struct EntryFilter {
    config: FilterConfig,
    globs: GlobSet,
    extensions: Vec<String>,
}

impl EntryFilter {
    /// Compile a filter from its configuration
    pub fn new(config: FilterConfig) -> Result<Self> {
        let globs = build_globset(&config.patterns)?;
        let extensions = config
            .extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect();

        Ok(Self {
            config,
            globs,
            extensions,
        })
    }

    /// A filter that accepts every entry
    pub fn match_all() -> Self {
        Self {
            config: FilterConfig::default(),
            globs: GlobSet::empty(),
            extensions: Vec::new(),
        }
    }

    /// The configuration this filter was built from
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Decide whether `entry` passes, short-circuiting on the first failed gate
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        let cfg = &self.config;

        if entry.hidden && !cfg.include_hidden {
            return false;
        }
        if entry.system && !cfg.include_system {
            return false;
        }
        if entry.readonly && !cfg.include_readonly {
            return false;
        }
        if cfg.min_size.is_some_and(|min| entry.size < min) {
            return false;
        }
        if cfg.max_size.is_some_and(|max| entry.size > max) {
            return false;
        }

        if self.globs.is_empty() && self.extensions.is_empty() {
            return true;
        }

        let matched = self.name_matches(entry);
        match cfg.mode {
            FilterMode::Include => matched,
            FilterMode::Exclude => !matched,
        }
    }

    fn name_matches(&self, entry: &CatalogEntry) -> bool {
        let name = match entry.path.file_name() {
            Some(name) => name,
            None => return false,
        };

        if self.globs.is_match(name) {
            return true;
        }

        entry
            .dotted_extension()
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(cfg!(windows))
            .literal_separator(true)
            .build()
            .map_err(|e| TreeSyncError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| TreeSyncError::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn file(name: &str, size: u64) -> CatalogEntry {
        CatalogEntry {
            exists: true,
            is_file: true,
            readable: true,
            writable: true,
            size,
            ..CatalogEntry::missing(PathBuf::from("/data").join(name))
        }
    }

    fn filter(config: FilterConfig) -> EntryFilter {
        EntryFilter::new(config).unwrap()
    }

    #[test]
    fn test_match_all_accepts_everything() {
        let f = EntryFilter::match_all();
        let mut hidden = file(".cache", 0);
        hidden.hidden = true;
        hidden.system = true;
        hidden.readonly = true;
        assert!(f.matches(&hidden));
        assert!(f.matches(&file("big.iso", u64::MAX)));
    }

    #[test]
    fn test_attribute_gates() {
        let f = filter(FilterConfig {
            include_hidden: false,
            include_system: false,
            include_readonly: false,
            ..Default::default()
        });

        let mut e = file("a.txt", 1);
        assert!(f.matches(&e));
        e.hidden = true;
        assert!(!f.matches(&e));
        e.hidden = false;
        e.system = true;
        assert!(!f.matches(&e));
        e.system = false;
        e.readonly = true;
        assert!(!f.matches(&e));
    }

    #[test]
    fn test_size_bounds_are_inclusive() {
        let f = filter(FilterConfig {
            min_size: Some(10),
            max_size: Some(20),
            ..Default::default()
        });
        assert!(!f.matches(&file("a", 9)));
        assert!(f.matches(&file("a", 10)));
        assert!(f.matches(&file("a", 20)));
        assert!(!f.matches(&file("a", 21)));
    }

    #[test]
    fn test_include_extensions_case_insensitive() {
        let f = filter(FilterConfig {
            extensions: vec![".txt".into(), "LOG".into()],
            ..Default::default()
        });
        assert!(f.matches(&file("a.txt", 1)));
        assert!(f.matches(&file("A.TXT", 1)));
        assert!(f.matches(&file("server.log", 1)));
        assert!(!f.matches(&file("b.jpg", 1)));
        assert!(!f.matches(&file("README", 1)));
    }

    #[test]
    fn test_exclude_mode_rejects_matches() {
        let f = filter(FilterConfig {
            patterns: vec!["*.tmp".into(), "~$*".into()],
            mode: FilterMode::Exclude,
            ..Default::default()
        });
        assert!(!f.matches(&file("build.tmp", 1)));
        assert!(!f.matches(&file("~$report.docx", 1)));
        assert!(f.matches(&file("report.docx", 1)));
    }

    #[test]
    fn test_globs_match_base_name_only() {
        let f = filter(FilterConfig {
            patterns: vec!["data?.[ch]sv".into()],
            ..Default::default()
        });
        assert!(f.matches(&CatalogEntry {
            path: PathBuf::from("/deep/nested/data1.csv"),
            ..file("x", 1)
        }));
        assert!(f.matches(&file("data2.hsv", 1)));
        assert!(!f.matches(&file("data10.csv", 1)));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = EntryFilter::new(FilterConfig {
            patterns: vec!["[unclosed".into()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, TreeSyncError::InvalidPattern { .. }));
    }

    proptest! {
        #[test]
        fn prop_matches_is_pure(
            name in "[a-zA-Z0-9_.]{1,24}",
            size in 0u64..1_000_000,
            hidden: bool,
            system: bool,
            readonly: bool,
            min in proptest::option::of(0u64..1_000_000),
            include_hidden: bool,
            exclude: bool,
        ) {
            let f = filter(FilterConfig {
                patterns: vec!["*.rs".into()],
                extensions: vec![".md".into()],
                min_size: min,
                include_hidden,
                mode: if exclude { FilterMode::Exclude } else { FilterMode::Include },
                ..Default::default()
            });
            let mut e = file(&name, size);
            e.hidden = hidden;
            e.system = system;
            e.readonly = readonly;
            prop_assert_eq!(f.matches(&e), f.matches(&e.clone()));
        }
    }
}
