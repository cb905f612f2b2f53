//! Transfer engine
//!
//! Runs one [`TransferJob`] on the calling thread: validate, optionally
//! pre-scan for totals, walk the source applying filter and conflict policy,
//! and for MIRROR delete what the source no longer has. Every failure ends up
//! in the returned [`TransferReport`]; nothing escapes `run`.

use crate::core::{normalize_lexically, unique_destination, ConflictDecider, Resolution, TransferJob, TransferMode, TransferReport};
use crate::error::{Result, TreeSyncError};
use crate::fs::{
    available_space, ensure_dir, lstat, nearest_existing_ancestor, prune_empty_dirs, remove_file, stat,
    CatalogEntry, CopyOptions, FileCopier, NameRules,
};
use crate::hash::ensure_files_match;
use crate::progress::{ProgressFn, ProgressSnapshot, ProgressTracker};
use crossbeam::channel::{self, Receiver};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Result of handling one walked entry
#[derive(Debug)]
enum EntryOutcome {
    /// Destination directory was created
    DirectoryCreated,
    /// Destination directory was already there
    DirectoryExisted,
    /// Symlink, device, socket... not transferred
    NotRegular,
    /// Rejected by the entry filter
    Filtered(PathBuf),
    /// Left alone because of the conflict policy
    Skipped(PathBuf),
    /// Larger than the single-file limit
    Oversized { relative: PathBuf, size: u64, limit: u64 },
    /// Copied (or would have been, in a dry run)
    Copied { bytes: u64 },
    /// Moved
    Moved { bytes: u64 },
    /// Failed with an error
    Failed { relative: PathBuf, error: TreeSyncError },
}

/// Copy/move/sync/mirror engine
pub struct TransferEngine {
    cancelled: Arc<AtomicBool>,
    tracker: Arc<ProgressTracker>,
    decider: Option<Arc<dyn ConflictDecider>>,
}

impl TransferEngine {
    /// Create a new engine
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            tracker: Arc::new(ProgressTracker::new()),
            decider: None,
        }
    }

    /// Install the decision hook consulted by the ASK policy
    pub fn with_decider(mut self, decider: impl ConflictDecider + 'static) -> Self {
        self.decider = Some(Arc::new(decider));
        self
    }

    /// Get cancellation flag for external control
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Shared progress counters, safe to read from any thread
    pub fn progress_tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    /// Request cancellation; honored at the next entry boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Execute `job`, reporting progress through `progress`
    pub fn run(&self, job: &TransferJob, progress: &mut ProgressFn<'_>) -> TransferReport {
        let mut report = TransferReport::start();
        self.tracker.reset();

        info!(
            "{} {} -> {}{}",
            job.mode,
            job.source.display(),
            job.destination.display(),
            if job.dry_run { " (dry run)" } else { "" }
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut run = Run::new(self, job, &mut report, &mut *progress);
            run.execute();
        }));

        if let Err(payload) = outcome {
            report.add_error(format!("Transfer aborted unexpectedly: {}", panic_message(&*payload)));
        }

        report.finalize();

        info!(
            "finished: {} copied, {} moved, {} skipped, {} failed, {} deleted, {} bytes in {:.2}s",
            report.files_copied,
            report.files_moved,
            report.files_skipped,
            report.files_failed,
            report.files_deleted,
            report.bytes_copied,
            report.elapsed_secs
        );

        report
    }

    /// Run `job` on a dedicated worker thread
    pub fn spawn<F>(self, job: TransferJob, mut on_progress: F) -> Result<TransferHandle>
    where
        F: FnMut(&str, Option<f64>) + Send + 'static,
    {
        let (sender, receiver) = channel::bounded(1);
        let cancelled = self.cancellation_flag();
        let tracker = self.progress_tracker();

        let thread = thread::Builder::new()
            .name("treesync-worker".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(&job, &mut on_progress)))
                    .map_err(|payload| TreeSyncError::WorkerLost(panic_message(&*payload)));
                // The handle may already be gone; nobody is left to tell.
                let _ = sender.send(outcome);
            })
            .map_err(|e| TreeSyncError::WorkerLost(e.to_string()))?;

        Ok(TransferHandle {
            cancelled,
            tracker,
            receiver,
            thread: Some(thread),
        })
    }
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `job` in the background with a fresh engine
pub fn spawn<F>(job: TransferJob, on_progress: F) -> Result<TransferHandle>
where
    F: FnMut(&str, Option<f64>) + Send + 'static,
{
    TransferEngine::new().spawn(job, on_progress)
}

/// Control and completion handle for a background run
pub struct TransferHandle {
    cancelled: Arc<AtomicBool>,
    tracker: Arc<ProgressTracker>,
    receiver: Receiver<Result<TransferReport>>,
    thread: Option<JoinHandle<()>>,
}

impl TransferHandle {
    /// Ask the worker to stop at the next entry boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Current progress counters
    pub fn progress(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Completion channel, for use in `select!` loops
    pub fn completion(&self) -> &Receiver<Result<TransferReport>> {
        &self.receiver
    }

    /// Block until the worker delivers its report
    pub fn wait(mut self) -> Result<TransferReport> {
        let delivered = self.receiver.recv();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        delivered.map_err(|_| TreeSyncError::WorkerLost("completion channel closed".to_string()))?
    }
}

/// Mutable state of one run
struct Run<'a, 'p> {
    engine: &'a TransferEngine,
    job: &'a TransferJob,
    report: &'a mut TransferReport,
    progress: &'a mut ProgressFn<'p>,
    copier: FileCopier,
    /// Relative paths the destination must keep (MIRROR only)
    keep: Option<HashSet<PathBuf>>,
    walk_errors: u64,
}

impl<'a, 'p> Run<'a, 'p> {
    fn new(
        engine: &'a TransferEngine,
        job: &'a TransferJob,
        report: &'a mut TransferReport,
        progress: &'a mut ProgressFn<'p>,
    ) -> Self {
        let copier = FileCopier::new(CopyOptions {
            buffer_size: job.buffer_size,
            preserve_permissions: job.preserve_permissions,
            preserve_timestamps: job.preserve_timestamps,
        });
        let keep = (job.mode == TransferMode::Mirror).then(HashSet::new);

        Self {
            engine,
            job,
            report,
            progress,
            copier,
            keep,
            walk_errors: 0,
        }
    }

    fn execute(&mut self) {
        if !self.validate() {
            return;
        }

        if self.job.compute_progress && !self.prescan() {
            return;
        }

        self.check_free_space();
        self.transfer_pass();

        if self.job.mode == TransferMode::Mirror {
            self.deletion_pass();
        }

        if self.job.mode == TransferMode::Move
            && self.job.prune_empty_dirs
            && !self.job.dry_run
            && !self.report.cancelled
        {
            match prune_empty_dirs(&self.job.source) {
                Ok(removed) => debug!("pruned {} empty source directories", removed),
                Err(e) => self.report.add_warning(format!("Could not remove empty source directories: {}", e)),
            }
        }

        let pct = self.engine.tracker.percent();
        (self.progress)("Done", pct);
    }

    fn should_stop(&mut self) -> bool {
        if self.engine.is_cancelled() {
            if !self.report.cancelled {
                info!("cancellation requested, stopping at entry boundary");
            }
            self.report.cancelled = true;
        }
        self.report.cancelled
    }

    /// Checks that must pass before any entry is touched
    fn validate(&mut self) -> bool {
        let job = self.job;

        let source = stat(&job.source);
        if !source.exists {
            self.report.add_error(TreeSyncError::NotFound(job.source.clone()).to_string());
            return false;
        }
        if !source.is_dir {
            self.report.add_error(TreeSyncError::NotADirectory(job.source.clone()).to_string());
            return false;
        }

        if let Err(e) = NameRules::host().validate_path(&job.destination) {
            self.report.add_error(e.to_string());
            return false;
        }

        let src_resolved = resolve(&job.source);
        let dst_resolved = resolve(&job.destination);
        if dst_resolved.starts_with(&src_resolved) {
            self.report.add_error(format!(
                "Destination {} lies inside source {}",
                job.destination.display(),
                job.source.display()
            ));
            return false;
        }
        if job.mode == TransferMode::Mirror && src_resolved.starts_with(&dst_resolved) {
            self.report.add_error(format!(
                "Source {} lies inside mirror destination {}",
                job.source.display(),
                job.destination.display()
            ));
            return false;
        }

        let destination = stat(&job.destination);
        if destination.exists && !destination.is_dir {
            self.report.add_error(TreeSyncError::NotADirectory(job.destination.clone()).to_string());
            return false;
        }
        if !destination.exists {
            if !job.create_destination {
                self.report.add_error(TreeSyncError::NotFound(job.destination.clone()).to_string());
                return false;
            }
            if !job.dry_run {
                if let Err(e) = ensure_dir(&job.destination) {
                    self.report.add_error(e.to_string());
                    return false;
                }
                debug!("created destination {}", job.destination.display());
            }
        }

        true
    }

    /// Count filtered files and bytes so progress can be a percentage
    fn prescan(&mut self) -> bool {
        (self.progress)("Scanning source...", None);

        let mut total_bytes = 0u64;
        let mut total_files = 0u64;
        let job = self.job;

        for item in WalkDir::new(&job.source).min_depth(1).follow_links(job.follow_symlinks) {
            if self.should_stop() {
                return false;
            }
            let entry = match item {
                Ok(entry) => entry,
                Err(_) => continue, // reported by the transfer pass
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let meta = stat(entry.path());
            if job.filter.matches(&meta) {
                total_bytes += meta.size;
                total_files += 1;
            }
        }

        info!("pre-scan: {} files, {} bytes", total_files, total_bytes);
        self.engine.tracker.set_totals(total_bytes, total_files);
        true
    }

    fn check_free_space(&mut self) {
        if self.job.dry_run {
            return;
        }
        let needed = match self.engine.tracker.snapshot().total_bytes {
            Some(bytes) => bytes,
            None => return,
        };
        match available_space(&self.job.destination) {
            Ok(available) if available < needed => self.report.add_warning(format!(
                "Destination may not have enough space: need {}, {} available",
                humansize::format_size(needed, humansize::BINARY),
                humansize::format_size(available, humansize::BINARY)
            )),
            Ok(_) => {}
            Err(e) => debug!("free space check skipped: {}", e),
        }
    }

    fn transfer_pass(&mut self) {
        let job = self.job;
        for item in WalkDir::new(&job.source).min_depth(1).follow_links(job.follow_symlinks) {
            if self.should_stop() {
                break;
            }

            let outcome = match item {
                Ok(entry) => self.process_entry(&entry),
                Err(err) => {
                    self.walk_errors += 1;
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let relative = self.relative(&path);
                    EntryOutcome::Failed {
                        relative,
                        error: walk_error(&path, err),
                    }
                }
            };
            self.apply(outcome);
        }
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.job.source).unwrap_or(path).to_path_buf()
    }

    fn process_entry(&mut self, entry: &DirEntry) -> EntryOutcome {
        let relative = self.relative(entry.path());
        let file_type = entry.file_type();

        if file_type.is_dir() {
            let dest_dir = self.job.destination.join(&relative);
            if dest_dir.is_dir() {
                return EntryOutcome::DirectoryExisted;
            }
            if self.job.dry_run {
                return EntryOutcome::DirectoryCreated;
            }
            return match ensure_dir(&dest_dir) {
                Ok(true) => EntryOutcome::DirectoryCreated,
                Ok(false) => EntryOutcome::DirectoryExisted,
                Err(error) => EntryOutcome::Failed { relative, error },
            };
        }

        if !file_type.is_file() {
            debug!("ignoring non-regular entry {}", entry.path().display());
            return EntryOutcome::NotRegular;
        }

        let source = stat(entry.path());
        if !self.job.filter.matches(&source) {
            debug!("filtered out {}", relative.display());
            return EntryOutcome::Filtered(relative);
        }

        if let Some(keep) = self.keep.as_mut() {
            keep.insert(relative.clone());
        }

        let verb = if self.job.mode.is_move() { "Moving" } else { "Copying" };
        let pct = self.engine.tracker.percent();
        (self.progress)(&format!("{} {}", verb, relative.display()), pct);

        let outcome = self.transfer_file(&source, relative);
        self.engine.tracker.add_file(source.size);
        outcome
    }

    fn transfer_file(&mut self, source: &CatalogEntry, relative: PathBuf) -> EntryOutcome {
        let job = self.job;
        let mut dest_path = job.destination.join(&relative);

        let existing = lstat(&dest_path);
        if existing.exists {
            let decider = if job.mode.is_unattended() {
                None
            } else {
                self.engine.decider.as_deref()
            };
            match job.effective_policy().resolve_with(source, &existing, decider) {
                Resolution::Skip => {
                    debug!("conflict: keeping existing {}", relative.display());
                    return EntryOutcome::Skipped(relative);
                }
                Resolution::Copy => debug!("conflict: replacing {}", relative.display()),
                Resolution::Rename => match unique_destination(&dest_path) {
                    Ok(renamed) => {
                        debug!("conflict: writing {} as {}", relative.display(), renamed.display());
                        dest_path = renamed;
                    }
                    Err(error) => return EntryOutcome::Failed { relative, error },
                },
            }
        }

        if let Some(limit) = job.max_file_size {
            if source.size > limit {
                return EntryOutcome::Oversized {
                    relative,
                    size: source.size,
                    limit,
                };
            }
        }

        if job.dry_run {
            return EntryOutcome::Copied { bytes: source.size };
        }

        if job.mode.is_move() {
            return match self.copier.move_file(&source.path, &dest_path) {
                Ok(method) => {
                    debug!("moved {} ({:?})", relative.display(), method);
                    EntryOutcome::Moved { bytes: source.size }
                }
                Err(error) => EntryOutcome::Failed { relative, error },
            };
        }

        let bytes = match self.copier.copy(&source.path, &dest_path) {
            Ok(bytes) => bytes,
            Err(error) => return EntryOutcome::Failed { relative, error },
        };

        if job.verify_copy {
            if let Err(error) = ensure_files_match(&source.path, &dest_path, job.verify_algorithm) {
                return EntryOutcome::Failed { relative, error };
            }
        }

        EntryOutcome::Copied { bytes }
    }

    fn apply(&mut self, outcome: EntryOutcome) {
        let report = &mut *self.report;
        match outcome {
            EntryOutcome::DirectoryCreated => report.directories_created += 1,
            EntryOutcome::DirectoryExisted | EntryOutcome::NotRegular => {}
            EntryOutcome::Filtered(relative) | EntryOutcome::Skipped(relative) => {
                report.files_processed += 1;
                report.record_skip(relative);
            }
            EntryOutcome::Oversized { relative, size, limit } => {
                report.files_processed += 1;
                report.add_warning(format!(
                    "Skipped {}: {} exceeds the {} single-file limit",
                    relative.display(),
                    humansize::format_size(size, humansize::BINARY),
                    humansize::format_size(limit, humansize::BINARY)
                ));
                report.record_skip(relative);
            }
            EntryOutcome::Copied { bytes } => {
                report.files_processed += 1;
                report.files_copied += 1;
                report.bytes_copied += bytes;
            }
            EntryOutcome::Moved { bytes } => {
                report.files_processed += 1;
                report.files_moved += 1;
                report.bytes_copied += bytes;
            }
            EntryOutcome::Failed { relative, error } => {
                report.files_processed += 1;
                report.record_failure(relative, error.to_string());
            }
        }
    }

    /// MIRROR: remove destination files the source does not have
    fn deletion_pass(&mut self) {
        if self.report.cancelled {
            return;
        }
        if self.walk_errors > 0 {
            self.report
                .add_warning("Mirror deletions skipped: the source could not be read completely");
            return;
        }
        if !self.job.destination.is_dir() {
            return;
        }

        let keep = self.keep.take().unwrap_or_default();
        let pct = self.engine.tracker.percent();
        (self.progress)("Removing extraneous files...", pct);

        let job = self.job;
        for item in WalkDir::new(&job.destination).min_depth(1) {
            if self.should_stop() {
                break;
            }
            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    self.report.add_error(walk_error(&path, err).to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&job.destination)
                .unwrap_or(entry.path())
                .to_path_buf();
            if keep.contains(&relative) {
                continue;
            }
            // Filtered-out files are outside the mirror's scope.
            if !job.filter.matches(&stat(entry.path())) {
                continue;
            }

            if job.dry_run {
                debug!("would delete {}", relative.display());
                self.report.files_deleted += 1;
                continue;
            }

            match remove_file(entry.path()) {
                Ok(()) => {
                    debug!("deleted {}", relative.display());
                    self.report.files_deleted += 1;
                }
                Err(e) => self.report.record_failure(relative, e.to_string()),
            }
        }
    }
}

fn walk_error(path: &Path, err: walkdir::Error) -> TreeSyncError {
    match err.into_io_error() {
        Some(io) => TreeSyncError::io(path, io),
        None => TreeSyncError::InvalidPath {
            path: path.to_path_buf(),
            reason: "filesystem loop".to_string(),
        },
    }
}

/// Canonical form of a path that may not exist yet
fn resolve(path: &Path) -> PathBuf {
    let path = &normalize_lexically(path);
    match nearest_existing_ancestor(path) {
        Some(ancestor) => {
            let rest = path.strip_prefix(&ancestor).unwrap_or(Path::new(""));
            let base = ancestor.canonicalize().unwrap_or(ancestor);
            base.join(rest)
        }
        None => path.to_path_buf(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobOptions;
    use crate::core::ConflictPolicy;
    use crate::fs::FilterConfig;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        src: PathBuf,
        dst: PathBuf,
    }

    /// src: a.txt (5 bytes), sub/b.txt (3 bytes); dst: empty
    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        std::fs::write(src.join("a.txt"), b"hello").unwrap();
        std::fs::write(src.join("sub/b.txt"), b"abc").unwrap();
        Fixture { _dir: dir, src, dst }
    }

    fn job(fx: &Fixture, options: JobOptions) -> TransferJob {
        TransferJob::with_options(&fx.src, &fx.dst, options).unwrap()
    }

    fn run(job: &TransferJob) -> TransferReport {
        TransferEngine::new().run(job, &mut |_: &str, _: Option<f64>| {})
    }

    fn set_mtime(path: &Path, offset_secs: i64) {
        let base = SystemTime::now();
        let time = if offset_secs >= 0 {
            base + Duration::from_secs(offset_secs as u64)
        } else {
            base - Duration::from_secs((-offset_secs) as u64)
        };
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(time)).unwrap();
    }

    #[test]
    fn test_copy_into_empty_destination() {
        let fx = fixture();
        let report = run(&job(&fx, JobOptions::default()));

        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.files_copied, 2);
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.bytes_copied, 8);
        assert_eq!(report.directories_created, 1);
        assert_eq!(std::fs::read(fx.dst.join("a.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(fx.dst.join("sub/b.txt")).unwrap(), b"abc");
        assert!(fx.src.join("a.txt").exists());
        assert!(report.is_finalized());
    }

    #[test]
    fn test_second_skip_run_copies_nothing() {
        let fx = fixture();
        let job = job(&fx, JobOptions::default());
        let first = run(&job);
        let second = run(&job);

        assert_eq!(first.files_copied, 2);
        assert_eq!(second.files_copied, 0);
        assert_eq!(second.files_skipped, first.files_copied);
        assert_eq!(second.directories_created, 0);
        assert!(second.success);
    }

    #[test]
    fn test_sync_keeps_newer_destination() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"edited at destination").unwrap();
        set_mtime(&fx.src.join("a.txt"), -3600);
        set_mtime(&fx.dst.join("a.txt"), 0);

        let report = run(&job(
            &fx,
            JobOptions {
                mode: TransferMode::Sync,
                conflict_policy: ConflictPolicy::Newer,
                ..Default::default()
            },
        ));

        assert!(report.success);
        assert_eq!(report.files_copied, 1);
        assert_eq!(report.skipped_files, vec![PathBuf::from("a.txt")]);
        assert_eq!(std::fs::read(fx.dst.join("a.txt")).unwrap(), b"edited at destination");
    }

    #[test]
    fn test_sync_replaces_older_destination() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"old").unwrap();
        set_mtime(&fx.dst.join("a.txt"), -3600);

        let report = run(&job(
            &fx,
            JobOptions {
                mode: TransferMode::Sync,
                conflict_policy: ConflictPolicy::Newer,
                ..Default::default()
            },
        ));

        assert_eq!(report.files_copied, 2);
        assert_eq!(std::fs::read(fx.dst.join("a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_mirror_deletes_extraneous_files() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"hello").unwrap();
        std::fs::write(fx.dst.join("stale.txt"), b"gone soon").unwrap();
        set_mtime(&fx.dst.join("a.txt"), 3600);

        let report = run(&job(
            &fx,
            JobOptions {
                mode: TransferMode::Mirror,
                ..Default::default()
            },
        ));

        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.files_deleted, 1);
        assert!(!fx.dst.join("stale.txt").exists());
        assert!(fx.dst.join("a.txt").exists());
        assert!(fx.dst.join("sub/b.txt").exists());
    }

    #[test]
    fn test_mirror_leaves_filtered_out_destination_files() {
        let fx = fixture();
        std::fs::write(fx.dst.join("notes.log"), b"not ours").unwrap();
        std::fs::write(fx.dst.join("stale.txt"), b"ours").unwrap();

        let report = run(&job(
            &fx,
            JobOptions {
                mode: TransferMode::Mirror,
                filter: FilterConfig {
                    extensions: vec![".txt".into()],
                    ..Default::default()
                },
                ..Default::default()
            },
        ));

        assert_eq!(report.files_deleted, 1);
        assert!(fx.dst.join("notes.log").exists());
        assert!(!fx.dst.join("stale.txt").exists());
    }

    #[test]
    fn test_mirror_dry_run_counts_without_deleting() {
        let fx = fixture();
        std::fs::write(fx.dst.join("stale.txt"), b"x").unwrap();

        let report = run(&job(
            &fx,
            JobOptions {
                mode: TransferMode::Mirror,
                dry_run: true,
                ..Default::default()
            },
        ));

        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.files_copied, 2);
        assert!(fx.dst.join("stale.txt").exists());
        assert!(!fx.dst.join("a.txt").exists());
    }

    #[test]
    fn test_move_with_extension_filter() {
        let fx = fixture();
        std::fs::write(fx.src.join("c.log"), b"log").unwrap();

        let report = run(&job(
            &fx,
            JobOptions {
                mode: TransferMode::Move,
                filter: FilterConfig {
                    extensions: vec![".txt".into()],
                    ..Default::default()
                },
                ..Default::default()
            },
        ));

        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.files_moved, 2);
        assert_eq!(report.files_copied, 0);
        assert_eq!(report.skipped_files, vec![PathBuf::from("c.log")]);
        assert!(fx.dst.join("a.txt").exists());
        assert!(fx.dst.join("sub/b.txt").exists());
        assert!(!fx.src.join("a.txt").exists());
        assert!(fx.src.join("c.log").exists());
        // sub/ was emptied by the move
        assert!(!fx.src.join("sub").exists());
        assert!(fx.src.exists());
    }

    #[test]
    fn test_move_keeps_empty_dirs_when_asked() {
        let fx = fixture();
        let report = run(&job(
            &fx,
            JobOptions {
                mode: TransferMode::Move,
                prune_empty_dirs: false,
                ..Default::default()
            },
        ));

        assert_eq!(report.files_moved, 2);
        assert!(fx.src.join("sub").is_dir());
    }

    #[test]
    fn test_dry_run_matches_real_counts_without_writing() {
        let fx = fixture();
        let dry = run(&job(
            &fx,
            JobOptions {
                dry_run: true,
                ..Default::default()
            },
        ));

        assert!(dry.success);
        assert!(!fx.dst.join("a.txt").exists());
        assert!(!fx.dst.join("sub").exists());

        let real = run(&job(&fx, JobOptions::default()));
        assert_eq!(dry.files_copied, real.files_copied);
        assert_eq!(dry.bytes_copied, real.bytes_copied);
        assert_eq!(dry.directories_created, real.directories_created);
        assert_eq!(dry.files_skipped, real.files_skipped);
    }

    #[test]
    fn test_dry_run_does_not_create_destination() {
        let fx = fixture();
        let missing = fx.dst.join("new/root");
        let job = TransferJob::with_options(
            &fx.src,
            &missing,
            JobOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();

        let report = run(&job);
        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.files_copied, 2);
        assert!(!missing.exists());
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let fx = fixture();
        std::fs::write(fx.src.join("big.bin"), vec![7u8; 4096]).unwrap();
        let job = job(&fx, JobOptions::default());

        let mut seen = Vec::new();
        TransferEngine::new().run(&job, &mut |_: &str, pct: Option<f64>| seen.push(pct));

        let percents: Vec<f64> = seen.iter().flatten().copied().collect();
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
        assert!(percents.iter().all(|p| (0.0..=100.0).contains(p)));
        assert_eq!(percents.last().copied(), Some(100.0));
    }

    #[test]
    fn test_progress_indeterminate_without_prescan() {
        let fx = fixture();
        let job = job(
            &fx,
            JobOptions {
                compute_progress: false,
                ..Default::default()
            },
        );

        let mut seen = Vec::new();
        TransferEngine::new().run(&job, &mut |_: &str, pct: Option<f64>| seen.push(pct));
        assert!(seen.iter().all(Option::is_none));
    }

    #[test]
    fn test_cancel_before_run() {
        let fx = fixture();
        let engine = TransferEngine::new();
        engine.cancel();

        let report = engine.run(&job(&fx, JobOptions::default()), &mut |_: &str, _: Option<f64>| {});
        assert!(report.cancelled);
        assert_eq!(report.files_copied, 0);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn test_cancel_stops_at_entry_boundary() {
        let fx = fixture();
        let engine = TransferEngine::new();
        let flag = engine.cancellation_flag();

        let report = engine.run(&job(&fx, JobOptions::default()), &mut |msg: &str, _: Option<f64>| {
            if msg.starts_with("Copying") {
                flag.store(true, Ordering::SeqCst);
            }
        });

        assert!(report.cancelled);
        assert_eq!(report.files_copied, 1);
        assert!(report.success);
    }

    #[test]
    fn test_rename_policy_writes_numbered_copy() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"existing").unwrap();

        let report = run(&job(
            &fx,
            JobOptions {
                conflict_policy: ConflictPolicy::Rename,
                ..Default::default()
            },
        ));

        assert_eq!(report.files_copied, 2);
        assert_eq!(std::fs::read(fx.dst.join("a.txt")).unwrap(), b"existing");
        assert_eq!(std::fs::read(fx.dst.join("a_1.txt")).unwrap(), b"hello");
    }

    fn relative_files(root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_mirror_with_rename_policy_converges() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"existing").unwrap();
        set_mtime(&fx.dst.join("a.txt"), -3600);
        let job = job(
            &fx,
            JobOptions {
                mode: TransferMode::Mirror,
                conflict_policy: ConflictPolicy::Rename,
                ..Default::default()
            },
        );

        let first = run(&job);
        let second = run(&job);

        let expected = vec![PathBuf::from("a.txt"), PathBuf::from("sub/b.txt")];
        assert!(first.success && second.success, "{:?} {:?}", first.errors, second.errors);
        assert_eq!(relative_files(&fx.dst), expected);
        assert_eq!(relative_files(&fx.src), expected);
        assert_eq!(second.files_deleted, 0);
        assert_eq!(std::fs::read(fx.dst.join("a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_failed_entry_does_not_stop_the_walk() {
        let fx = fixture();
        // A directory where a.txt should go makes that one copy fail.
        std::fs::create_dir_all(fx.dst.join("a.txt/occupied")).unwrap();

        let report = run(&job(
            &fx,
            JobOptions {
                conflict_policy: ConflictPolicy::Overwrite,
                ..Default::default()
            },
        ));

        assert!(!report.success);
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.failed_files, vec![PathBuf::from("a.txt")]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("a.txt"));
        assert_eq!(report.files_copied, 1);
        assert_eq!(std::fs::read(fx.dst.join("sub/b.txt")).unwrap(), b"abc");
    }

    #[test]
    fn test_rename_exhaustion_fails_only_that_file() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"taken").unwrap();
        for n in 1..=crate::core::MAX_RENAME_ATTEMPTS {
            std::fs::File::create(fx.dst.join(format!("a_{}.txt", n))).unwrap();
        }

        let report = run(&job(
            &fx,
            JobOptions {
                conflict_policy: ConflictPolicy::Rename,
                ..Default::default()
            },
        ));

        assert!(!report.success);
        assert_eq!(report.failed_files, vec![PathBuf::from("a.txt")]);
        assert_eq!(report.files_copied, 1);
        assert_eq!(std::fs::read(fx.dst.join("a.txt")).unwrap(), b"taken");
        assert!(fx.dst.join("sub/b.txt").exists());
    }

    #[test]
    fn test_verification_mismatch_is_recorded_as_failure() {
        let fx = fixture();
        let engine = TransferEngine::new();
        let job = job(
            &fx,
            JobOptions {
                verify_copy: true,
                ..Default::default()
            },
        );
        let mut report = TransferReport::start();
        let mut progress = |_: &str, _: Option<f64>| {};
        let mut run = Run::new(&engine, &job, &mut report, &mut progress);

        let error = crate::hash::ensure_files_match(
            &fx.src.join("a.txt"),
            &fx.src.join("sub/b.txt"),
            job.verify_algorithm,
        )
        .unwrap_err();
        run.apply(EntryOutcome::Failed {
            relative: PathBuf::from("a.txt"),
            error,
        });
        drop(run);
        report.finalize();

        assert!(!report.success);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.failed_files, vec![PathBuf::from("a.txt")]);
        assert!(report.errors[0].contains("Integrity check failed"));
    }

    #[test]
    fn test_destination_reaching_into_source_via_parent_dirs_rejected() {
        let fx = fixture();
        let sneaky = fx.dst.join("new/../../src/inner");

        let report = run(&TransferJob::new(&fx.src, &sneaky, TransferMode::Copy).unwrap());
        assert!(!report.success);
        assert_eq!(report.files_copied, 0);
        assert!(!fx.src.join("inner").exists());

        // Same path handed to the engine without construction-time cleanup.
        let mut raw = TransferJob::new(&fx.src, &fx.dst, TransferMode::Copy).unwrap();
        raw.destination = sneaky;
        let report = run(&raw);
        assert!(!report.success);
        assert_eq!(report.files_copied, 0);
        assert!(!fx.src.join("inner").exists());
        assert!(!fx.dst.join("new").exists());
    }

    #[test]
    fn test_overwrite_policy() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"existing but longer").unwrap();

        let report = run(&job(
            &fx,
            JobOptions {
                conflict_policy: ConflictPolicy::Overwrite,
                ..Default::default()
            },
        ));

        assert_eq!(report.files_copied, 2);
        assert_eq!(std::fs::read(fx.dst.join("a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_ask_consults_decider_in_copy_mode() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"existing").unwrap();
        let asked = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&asked);

        let engine = TransferEngine::new().with_decider(move |src: &CatalogEntry, _: &CatalogEntry| {
            log.lock().unwrap().push(src.path.clone());
            Resolution::Skip
        });
        let job = job(
            &fx,
            JobOptions {
                conflict_policy: ConflictPolicy::Ask,
                ..Default::default()
            },
        );

        let report = engine.run(&job, &mut |_: &str, _: Option<f64>| {});
        assert_eq!(asked.lock().unwrap().len(), 1);
        assert_eq!(report.skipped_files, vec![PathBuf::from("a.txt")]);
    }

    #[test]
    fn test_ask_never_consults_decider_in_sync_mode() {
        let fx = fixture();
        std::fs::write(fx.dst.join("a.txt"), b"existing").unwrap();
        set_mtime(&fx.dst.join("a.txt"), -3600);

        let engine = TransferEngine::new()
            .with_decider(|_: &CatalogEntry, _: &CatalogEntry| -> Resolution { panic!("asked during sync") });
        let job = job(
            &fx,
            JobOptions {
                mode: TransferMode::Sync,
                conflict_policy: ConflictPolicy::Ask,
                ..Default::default()
            },
        );

        let report = engine.run(&job, &mut |_: &str, _: Option<f64>| {});
        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.files_copied, 2);
    }

    #[test]
    fn test_verified_copy() {
        let fx = fixture();
        let report = run(&job(
            &fx,
            JobOptions {
                verify_copy: true,
                verify_algorithm: crate::config::HashAlgorithm::Blake3,
                ..Default::default()
            },
        ));
        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.files_copied, 2);
    }

    #[test]
    fn test_max_file_size_skips_with_warning() {
        let fx = fixture();
        let report = run(&job(
            &fx,
            JobOptions {
                max_file_size: Some(4),
                ..Default::default()
            },
        ));

        assert!(report.success);
        assert_eq!(report.files_copied, 1);
        assert_eq!(report.skipped_files, vec![PathBuf::from("a.txt")]);
        assert_eq!(report.warnings.len(), 1);
        assert!(!fx.dst.join("a.txt").exists());
    }

    #[test]
    fn test_missing_source_fails_validation() {
        let dir = TempDir::new().unwrap();
        let job = TransferJob::new(dir.path().join("nope"), dir.path().join("dst"), TransferMode::Copy).unwrap();

        let report = run(&job);
        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.files_processed, 0);
        assert!(!dir.path().join("dst").exists());
    }

    #[test]
    fn test_source_file_is_not_a_directory() {
        let fx = fixture();
        let job = TransferJob::new(fx.src.join("a.txt"), &fx.dst, TransferMode::Copy).unwrap();
        let report = run(&job);
        assert!(!report.success);
    }

    #[test]
    fn test_destination_inside_source_rejected() {
        let fx = fixture();
        let job = TransferJob::new(&fx.src, fx.src.join("sub/inner"), TransferMode::Copy).unwrap();

        let report = run(&job);
        assert!(!report.success);
        assert!(!fx.src.join("sub/inner").exists());
    }

    #[test]
    fn test_missing_destination_without_create() {
        let fx = fixture();
        let job = TransferJob::with_options(
            &fx.src,
            fx.dst.join("missing"),
            JobOptions {
                create_destination: false,
                ..Default::default()
            },
        )
        .unwrap();

        let report = run(&job);
        assert!(!report.success);
        assert!(!fx.dst.join("missing").exists());
    }

    #[test]
    fn test_missing_destination_is_created() {
        let fx = fixture();
        let target = fx.dst.join("deep/new");
        let job = TransferJob::new(&fx.src, &target, TransferMode::Copy).unwrap();

        let report = run(&job);
        assert!(report.success, "{:?}", report.errors);
        assert!(target.join("sub/b.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_ignored_unless_followed() {
        let fx = fixture();
        std::os::unix::fs::symlink(fx.src.join("a.txt"), fx.src.join("link.txt")).unwrap();

        let report = run(&job(&fx, JobOptions::default()));
        assert_eq!(report.files_processed, 2);
        assert!(!fx.dst.join("link.txt").exists());

        let followed = run(&job(
            &fx,
            JobOptions {
                follow_symlinks: true,
                conflict_policy: ConflictPolicy::Overwrite,
                ..Default::default()
            },
        ));
        assert_eq!(followed.files_copied, 3);
        assert_eq!(std::fs::read(fx.dst.join("link.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_spawn_and_wait() {
        let fx = fixture();
        let handle = spawn(job(&fx, JobOptions::default()), |_, _| {}).unwrap();
        let report = handle.wait().unwrap();

        assert!(report.success);
        assert_eq!(report.files_copied, 2);
        assert!(fx.dst.join("sub/b.txt").exists());
    }

    #[test]
    fn test_spawned_run_reports_progress() {
        let fx = fixture();
        let handle = spawn(job(&fx, JobOptions::default()), |_, _| {}).unwrap();
        let report = handle.completion().recv().unwrap().unwrap();

        assert!(handle.progress().files_done >= 2);
        assert_eq!(handle.progress().percent(), Some(100.0));
        assert_eq!(report.files_copied, 2);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let fx = fixture();
        let report = TransferEngine::new().run(&job(&fx, JobOptions::default()), &mut |msg: &str, _: Option<f64>| {
            if msg.starts_with("Copying") {
                panic!("callback exploded");
            }
        });

        assert!(!report.success);
        assert!(report.is_finalized());
        assert!(report.errors.iter().any(|e| e.contains("callback exploded")));
    }
}
