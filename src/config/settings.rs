//! Configuration settings for treesync
//!
//! Defines the per-run option set, its JSON presets, and the CLI that
//! builds one.

use crate::core::{ConflictPolicy, TransferMode};
use crate::error::{Result, TreeSyncError};
use crate::fs::{FilterConfig, FilterMode};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// treesync - copy, move, sync and mirror directory trees
#[derive(Parser, Debug, Clone)]
#[command(name = "treesync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy, move, sync or mirror a directory tree")]
#[command(long_about = r#"
treesync walks a source directory and applies it to a destination directory.

Modes:
  copy    copy files, the source is left untouched
  move    move files, emptied source directories are removed
  sync    copy, replacing destination files only when the source is newer
  mirror  sync, then delete destination files the source no longer has

Examples:
  treesync ~/photos /mnt/backup/photos --mode sync
  treesync src dst --ext .jpg --ext .png --conflict rename
  treesync src dst --mode mirror --dry-run --output-format json
  treesync src dst --preset nightly.json --verify blake3
"#)]
pub struct CliArgs {
    /// Source directory
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination directory
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,

    /// Operation mode
    #[arg(short = 'm', long, value_enum, value_name = "MODE")]
    pub mode: Option<TransferMode>,

    /// What to do when a destination file already exists
    #[arg(short = 'c', long, value_enum, value_name = "POLICY")]
    pub conflict: Option<ConflictPolicy>,

    /// File name glob (repeatable)
    #[arg(long = "pattern", value_name = "GLOB")]
    pub patterns: Vec<String>,

    /// File extension, e.g. .txt (repeatable)
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Treat --pattern/--ext as exclusions instead of inclusions
    #[arg(long)]
    pub exclude: bool,

    /// Skip files smaller than this (e.g., 1K)
    #[arg(long, value_name = "SIZE")]
    pub min_size: Option<String>,

    /// Skip files larger than this (e.g., 100M)
    #[arg(long, value_name = "SIZE")]
    pub max_size: Option<String>,

    /// Skip hidden files
    #[arg(long)]
    pub skip_hidden: bool,

    /// Skip system files
    #[arg(long)]
    pub skip_system: bool,

    /// Skip read-only files
    #[arg(long)]
    pub skip_readonly: bool,

    /// Verify each copy by hash (default algorithm: xxhash3)
    #[arg(long, value_enum, value_name = "ALGO", num_args = 0..=1)]
    pub verify: Option<Option<HashAlgorithm>>,

    /// Dry run (show what would be done)
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not copy modification times
    #[arg(long)]
    pub no_preserve_times: bool,

    /// Do not copy permission bits
    #[arg(long)]
    pub no_preserve_perms: bool,

    /// Fail instead of creating a missing destination
    #[arg(long)]
    pub no_create: bool,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    pub follow_symlinks: bool,

    /// Skip the pre-scan and progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Skip (with a warning) any single file larger than this
    #[arg(long, value_name = "SIZE")]
    pub max_file_size: Option<String>,

    /// Keep source directories emptied by a move
    #[arg(long)]
    pub keep_empty_dirs: bool,

    /// Buffer size for file copies (e.g., 1M, 64K)
    #[arg(short = 'b', long, value_name = "SIZE")]
    pub buffer_size: Option<String>,

    /// Load options from a JSON preset; flags given here take precedence
    #[arg(long, value_name = "PATH")]
    pub preset: Option<PathBuf>,

    /// Write the effective options to a JSON preset
    #[arg(long, value_name = "PATH")]
    pub save_preset: Option<PathBuf>,

    /// Output format for the final report
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

/// Hash algorithm for integrity verification
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// XXHash3 - Ultra fast, non-cryptographic (128-bit)
    #[default]
    #[value(name = "xxhash3")]
    XXHash3,
    /// XXHash64 - Fast, non-cryptographic (64-bit)
    #[value(name = "xxhash64")]
    XXHash64,
    /// BLAKE3 - Fast and cryptographically secure
    #[value(name = "blake3")]
    Blake3,
    /// SHA-256 - Standard cryptographic hash
    #[value(name = "sha256")]
    Sha256,
}

impl HashAlgorithm {
    /// Get the output size in bytes
    pub fn output_size(&self) -> usize {
        match self {
            Self::XXHash3 => 16,
            Self::XXHash64 => 8,
            Self::Blake3 => 32,
            Self::Sha256 => 32,
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::XXHash3 => "XXHash3",
            Self::XXHash64 => "XXHash64",
            Self::Blake3 => "BLAKE3",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Every per-run option, as stored in a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Operation mode
    pub mode: TransferMode,
    /// Conflict policy
    pub conflict_policy: ConflictPolicy,
    /// Entry filter settings
    pub filter: FilterConfig,
    /// Preserve modification times
    pub preserve_timestamps: bool,
    /// Preserve permissions
    pub preserve_permissions: bool,
    /// Create a missing destination
    pub create_destination: bool,
    /// Verify copies by hash
    pub verify_copy: bool,
    /// Verification algorithm
    pub verify_algorithm: HashAlgorithm,
    /// Follow symlinks
    pub follow_symlinks: bool,
    /// Pre-scan for percentages
    pub compute_progress: bool,
    /// Dry run mode
    pub dry_run: bool,
    /// Largest single file to transfer
    pub max_file_size: Option<u64>,
    /// Remove emptied source directories after a move
    pub prune_empty_dirs: bool,
    /// Buffer size in bytes
    pub buffer_size: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            mode: TransferMode::Copy,
            conflict_policy: ConflictPolicy::Skip,
            filter: FilterConfig::default(),
            preserve_timestamps: true,
            preserve_permissions: true,
            create_destination: true,
            verify_copy: false,
            verify_algorithm: HashAlgorithm::XXHash3,
            follow_symlinks: false,
            compute_progress: true,
            dry_run: false,
            max_file_size: None,
            prune_empty_dirs: true,
            buffer_size: 1024 * 1024, // 1MB
        }
    }
}

impl JobOptions {
    /// Apply the flags given on the command line on top of `base`.
    ///
    /// Flags that were not given leave the base value alone, so a preset
    /// can be refined without restating it.
    pub fn from_cli(args: &CliArgs, base: JobOptions) -> Result<Self> {
        let mut options = base;

        if let Some(mode) = args.mode {
            options.mode = mode;
        }
        if let Some(policy) = args.conflict {
            options.conflict_policy = policy;
        }

        let filter = &mut options.filter;
        if !args.patterns.is_empty() {
            filter.patterns = args.patterns.clone();
        }
        if !args.extensions.is_empty() {
            filter.extensions = args.extensions.clone();
        }
        if args.exclude {
            filter.mode = FilterMode::Exclude;
        }
        if let Some(size) = &args.min_size {
            filter.min_size = Some(parse_size_arg("min size", size)?);
        }
        if let Some(size) = &args.max_size {
            filter.max_size = Some(parse_size_arg("max size", size)?);
        }
        if args.skip_hidden {
            filter.include_hidden = false;
        }
        if args.skip_system {
            filter.include_system = false;
        }
        if args.skip_readonly {
            filter.include_readonly = false;
        }

        if let Some(algorithm) = args.verify {
            options.verify_copy = true;
            if let Some(algorithm) = algorithm {
                options.verify_algorithm = algorithm;
            }
        }
        if args.dry_run {
            options.dry_run = true;
        }
        if args.no_preserve_times {
            options.preserve_timestamps = false;
        }
        if args.no_preserve_perms {
            options.preserve_permissions = false;
        }
        if args.no_create {
            options.create_destination = false;
        }
        if args.follow_symlinks {
            options.follow_symlinks = true;
        }
        if args.no_progress {
            options.compute_progress = false;
        }
        if let Some(size) = &args.max_file_size {
            options.max_file_size = Some(parse_size_arg("max file size", size)?);
        }
        if args.keep_empty_dirs {
            options.prune_empty_dirs = false;
        }
        if let Some(size) = &args.buffer_size {
            options.buffer_size = parse_size_arg("buffer size", size)? as usize;
        }

        Ok(options)
    }
}

fn parse_size_arg(what: &str, value: &str) -> Result<u64> {
    parse_size(value).map_err(|e| TreeSyncError::config(format!("Invalid {}: {}", what, e)))
}

/// Load a preset written by [`save_preset`]
pub fn load_preset(path: &Path) -> Result<JobOptions> {
    let text = std::fs::read_to_string(path).map_err(|e| TreeSyncError::PresetError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| TreeSyncError::PresetError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Write `options` as pretty JSON
pub fn save_preset(path: &Path, options: &JobOptions) -> Result<()> {
    let preset_error = |message: String| TreeSyncError::PresetError {
        path: path.to_path_buf(),
        message,
    };
    let json = serde_json::to_string_pretty(options).map_err(|e| preset_error(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| preset_error(e.to_string()))
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        let num = size.trim_end_matches(|c| c == 'T' || c == 'B');
        (num, 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if !num.is_finite() || num < 0.0 {
        return Err(format!("Invalid number: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
