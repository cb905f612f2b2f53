//! Outcome record of one transfer run

use chrono::{DateTime, Utc};
use console::style;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Counts, timing and problems collected during a run.
///
/// Mutated entry by entry by the worker that owns the run, then frozen by
/// [`TransferReport::finalize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    /// True iff no error was recorded
    pub success: bool,
    /// True if the run stopped early on request
    pub cancelled: bool,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run was finalized
    pub finished_at: Option<DateTime<Utc>>,
    /// Regular files that reached the filter
    pub files_processed: u64,
    /// Files copied (or that would be, in a dry run)
    pub files_copied: u64,
    /// Files moved
    pub files_moved: u64,
    /// Files skipped by filter, conflict policy or size limit
    pub files_skipped: u64,
    /// Files that failed
    pub files_failed: u64,
    /// Destination files removed by MIRROR
    pub files_deleted: u64,
    /// Destination directories created
    pub directories_created: u64,
    /// Bytes written (or that would be, in a dry run)
    pub bytes_copied: u64,
    /// Wall time between start and finalize
    pub elapsed_secs: f64,
    /// Average throughput in MB/s
    pub throughput_mbps: f64,
    /// Blocking failures
    pub errors: Vec<String>,
    /// Non-blocking notices
    pub warnings: Vec<String>,
    /// Relative paths of skipped files
    pub skipped_files: Vec<PathBuf>,
    /// Relative paths of failed files
    pub failed_files: Vec<PathBuf>,
    #[serde(skip)]
    finalized: bool,
}

impl TransferReport {
    /// Empty report stamped with the current time
    pub fn start() -> Self {
        Self {
            success: false,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
            files_processed: 0,
            files_copied: 0,
            files_moved: 0,
            files_skipped: 0,
            files_failed: 0,
            files_deleted: 0,
            directories_created: 0,
            bytes_copied: 0,
            elapsed_secs: 0.0,
            throughput_mbps: 0.0,
            errors: Vec::new(),
            warnings: Vec::new(),
            skipped_files: Vec::new(),
            failed_files: Vec::new(),
            finalized: false,
        }
    }

    /// Record a blocking error
    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.errors.push(message);
    }

    /// Record a non-blocking warning
    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Count a skipped file
    pub fn record_skip(&mut self, relative: PathBuf) {
        self.files_skipped += 1;
        self.skipped_files.push(relative);
    }

    /// Count a failed file and keep its error
    pub fn record_failure(&mut self, relative: PathBuf, message: impl Into<String>) {
        self.files_failed += 1;
        self.add_error(format!("{}: {}", relative.display(), message.into()));
        self.failed_files.push(relative);
    }

    /// Stamp the end time and derive elapsed time, throughput and success.
    ///
    /// Only the first call has any effect.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let finished = Utc::now();
        self.finished_at = Some(finished);
        self.elapsed_secs = (finished - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        self.throughput_mbps = if self.elapsed_secs > 0.0 && self.bytes_copied > 0 {
            self.bytes_copied as f64 / BYTES_PER_MB / self.elapsed_secs
        } else {
            0.0
        };

        self.success = self.errors.is_empty();
    }

    /// Whether `finalize` has run
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Transfer Summary ===");
        println!("Processed:       {}", self.files_processed);
        println!("Copied:          {}", self.files_copied);
        if self.files_moved > 0 {
            println!("Moved:           {}", self.files_moved);
        }
        println!("Skipped:         {}", self.files_skipped);
        println!("Failed:          {}", self.files_failed);
        if self.files_deleted > 0 {
            println!("Deleted:         {}", self.files_deleted);
        }
        println!("Directories:     {}", self.directories_created);
        println!("Bytes copied:    {}", humansize::format_size(self.bytes_copied, humansize::BINARY));
        println!(
            "Duration:        {}",
            humantime::format_duration(Duration::from_millis((self.elapsed_secs * 1000.0) as u64))
        );
        println!("Throughput:      {:.2} MB/s", self.throughput_mbps);

        if self.cancelled {
            println!("{}", style("Run was cancelled before completion").yellow());
        }

        if !self.warnings.is_empty() {
            println!("\n{} {}", style("Warnings:").yellow().bold(), self.warnings.len());
            for warning in &self.warnings {
                println!("  {}", warning);
            }
        }

        if !self.errors.is_empty() {
            println!("\n{} {}", style("Errors:").red().bold(), self.errors.len());
            for error in &self.errors {
                println!("  {}", error);
            }
        }
    }
}

impl Default for TransferReport {
    fn default() -> Self {
        Self::start()
    }
}
