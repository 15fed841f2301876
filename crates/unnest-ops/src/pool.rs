//! Relocation worker threads.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use unnest_core::{CollisionMode, FlattenError, Job, Reporter, RunStats, check_path_len};
use unnest_scan::JobQueue;

use crate::allocator::UniqueNameAllocator;
use crate::relocate::Relocator;

/// Everything a worker shares with its siblings.
pub struct WorkerContext {
    /// Canonical destination directory.
    pub destination: PathBuf,
    /// Collision policy.
    pub mode: CollisionMode,
    /// Log decisions instead of relocating.
    pub dry_run: bool,
    /// Shared name reservations.
    pub allocator: Arc<UniqueNameAllocator>,
    /// Performs the rename or copy.
    pub relocator: Arc<Relocator>,
    /// Run-wide counters.
    pub stats: Arc<RunStats>,
    /// Log sink.
    pub reporter: Arc<dyn Reporter>,
}

impl WorkerContext {
    /// Handle one job from start to finish. Never fails; the outcome lands
    /// in the statistics.
    pub fn process(&self, job: &Job) {
        let target = match self.resolve_target(job) {
            Ok(Some(target)) => target,
            Ok(None) => {
                self.reporter.debug(&format!(
                    "Skip (exists): '{}'",
                    self.destination.join(job.file_name()).display()
                ));
                self.stats.record_skipped();
                return;
            }
            Err(e) => {
                self.reporter
                    .error(&format!("ERROR: cannot move '{}': {e}", job.source.display()));
                self.stats.record_failed();
                return;
            }
        };

        if self.dry_run {
            self.reporter.info(&format!(
                "WOULD MOVE: '{}' -> '{}'",
                job.source.display(),
                target.display()
            ));
            self.stats.record_skipped();
            return;
        }

        match self.relocator.relocate(job, &target, self.mode) {
            Ok(relocation) => {
                self.stats.record_moved(relocation.bytes_copied());
                self.reporter.debug(&format!(
                    "Moved: '{}' -> '{}'",
                    job.source.display(),
                    target.display()
                ));
            }
            Err(e) => {
                self.allocator.release(&target);
                self.stats.record_failed();
                self.reporter.error(&format!(
                    "ERROR: cannot move '{}' -> '{}': {e}",
                    job.source.display(),
                    target.display()
                ));
            }
        }
    }

    /// Destination path for `job`, or `None` when skip mode finds it taken.
    fn resolve_target(&self, job: &Job) -> Result<Option<PathBuf>, FlattenError> {
        let name = job.file_name();
        match self.mode {
            CollisionMode::Skip => self.allocator.claim_literal(&self.destination, name),
            CollisionMode::Rename => self.allocator.allocate(&self.destination, name).map(Some),
            CollisionMode::Overwrite => {
                let literal = self.destination.join(name);
                check_path_len(&literal)?;
                Ok(Some(literal))
            }
        }
    }
}

/// Fixed set of named worker threads draining one queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<u64>>,
    reporter: Arc<dyn Reporter>,
}

impl WorkerPool {
    /// Spawn `count` workers. Each exits once the queue is done and drained.
    ///
    /// If a thread cannot be spawned the queue is aborted, the workers
    /// already started are joined, and the error is returned.
    pub fn start(
        count: usize,
        queue: Arc<JobQueue>,
        context: Arc<WorkerContext>,
    ) -> Result<Self, FlattenError> {
        let mut handles = Vec::with_capacity(count);

        for id in 0..count.max(1) {
            let queue_ref = Arc::clone(&queue);
            let worker = Arc::clone(&context);
            let spawned = thread::Builder::new()
                .name(format!("unnest-worker-{id}"))
                .spawn(move || run_worker(&queue_ref, &worker));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    queue.abort();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(FlattenError::io(Path::new("<worker thread>"), e));
                }
            }
        }

        context
            .reporter
            .debug(&format!("Started {} worker thread(s)", handles.len()));

        Ok(Self {
            handles,
            reporter: Arc::clone(&context.reporter),
        })
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Returns the number of jobs processed.
    pub fn join(self) -> u64 {
        let mut processed = 0;
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            match handle.join() {
                Ok(count) => processed += count,
                Err(_) => self.reporter.error(&format!("{name} panicked")),
            }
        }
        processed
    }
}

fn run_worker(queue: &JobQueue, context: &WorkerContext) -> u64 {
    let mut processed = 0;
    while let Some(job) = queue.pop() {
        context.process(&job);
        processed += 1;
    }
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relocate::RelocateOptions;
    use std::fs;
    use tempfile::TempDir;
    use unnest_core::MemoryReporter;

    fn context(
        destination: &Path,
        mode: CollisionMode,
        dry_run: bool,
    ) -> (Arc<WorkerContext>, Arc<MemoryReporter>) {
        let reporter = Arc::new(MemoryReporter::new());
        let context = WorkerContext {
            destination: destination.to_path_buf(),
            mode,
            dry_run,
            allocator: Arc::new(UniqueNameAllocator::new()),
            relocator: Arc::new(Relocator::new(RelocateOptions::default(), reporter.clone())),
            stats: Arc::new(RunStats::new()),
            reporter: reporter.clone(),
        };
        (Arc::new(context), reporter)
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir_all(src.join("x")).unwrap();
        fs::create_dir_all(&dst).unwrap();
        (temp, src, dst)
    }

    #[test]
    fn test_process_moves_file() {
        let (_temp, src, dst) = setup();
        fs::write(src.join("x/a.txt"), "a").unwrap();
        let (ctx, reporter) = context(&dst, CollisionMode::Rename, false);

        ctx.process(&Job::file(src.join("x/a.txt"), "x/a.txt", 1));

        assert_eq!(ctx.stats.snapshot().moved, 1);
        assert!(dst.join("a.txt").exists());
        assert!(reporter.contains("Moved: "));
    }

    #[test]
    fn test_process_skip_existing() {
        let (_temp, src, dst) = setup();
        fs::write(src.join("x/a.txt"), "new").unwrap();
        fs::write(dst.join("a.txt"), "old").unwrap();
        let (ctx, reporter) = context(&dst, CollisionMode::Skip, false);

        ctx.process(&Job::file(src.join("x/a.txt"), "x/a.txt", 1));

        assert_eq!(ctx.stats.snapshot().skipped, 1);
        assert!(src.join("x/a.txt").exists());
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "old");
        assert!(reporter.contains("Skip (exists)"));
    }

    #[test]
    fn test_process_dry_run_touches_nothing() {
        let (_temp, src, dst) = setup();
        fs::write(src.join("x/a.txt"), "a").unwrap();
        let (ctx, reporter) = context(&dst, CollisionMode::Rename, true);

        ctx.process(&Job::file(src.join("x/a.txt"), "x/a.txt", 1));

        let stats = ctx.stats.snapshot();
        assert_eq!((stats.moved, stats.skipped), (0, 1));
        assert!(src.join("x/a.txt").exists());
        assert!(!dst.join("a.txt").exists());
        assert!(reporter.contains("WOULD MOVE: "));
    }

    #[test]
    fn test_process_failure_is_counted() {
        let (_temp, src, dst) = setup();
        let (ctx, reporter) = context(&dst, CollisionMode::Rename, false);

        ctx.process(&Job::file(src.join("x/vanished.txt"), "x/vanished.txt", 1));

        assert_eq!(ctx.stats.snapshot().failed, 1);
        assert!(reporter.contains("ERROR: cannot move"));
    }

    #[test]
    fn test_failed_job_frees_its_name_for_skip() {
        let (_temp, src, dst) = setup();
        fs::create_dir_all(src.join("y")).unwrap();
        fs::write(src.join("y/a.txt"), "y").unwrap();
        let (ctx, _) = context(&dst, CollisionMode::Skip, false);

        ctx.process(&Job::file(src.join("x/a.txt"), "x/a.txt", 1));
        ctx.process(&Job::file(src.join("y/a.txt"), "y/a.txt", 1));

        let stats = ctx.stats.snapshot();
        assert_eq!((stats.moved, stats.skipped, stats.failed), (1, 0, 1));
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "y");
        assert!(!src.join("y/a.txt").exists());
    }

    #[test]
    fn test_failed_job_leaves_no_gap_in_numbering() {
        let (_temp, src, dst) = setup();
        fs::create_dir_all(src.join("y")).unwrap();
        fs::write(src.join("y/p.txt"), "y").unwrap();
        let (ctx, _) = context(&dst, CollisionMode::Rename, false);

        ctx.process(&Job::file(src.join("x/p.txt"), "x/p.txt", 1));
        ctx.process(&Job::file(src.join("y/p.txt"), "y/p.txt", 1));

        assert_eq!(ctx.stats.snapshot().moved, 1);
        assert!(dst.join("p.txt").exists());
        assert!(!dst.join("p_1.txt").exists());
        assert_eq!(ctx.allocator.reserved_count(), 1);
    }

    #[test]
    fn test_pool_drains_queue() {
        let (_temp, src, dst) = setup();
        let queue = Arc::new(JobQueue::new());
        let (ctx, _) = context(&dst, CollisionMode::Rename, false);
        let pool = WorkerPool::start(4, Arc::clone(&queue), Arc::clone(&ctx)).unwrap();
        assert_eq!(pool.len(), 4);

        for n in 0..40 {
            let dir = src.join(format!("d{n}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("same.txt"), n.to_string()).unwrap();
            queue
                .push(Job::file(dir.join("same.txt"), format!("d{n}/same.txt"), 1))
                .unwrap();
        }
        queue.signal_done();

        assert_eq!(pool.join(), 40);
        assert_eq!(ctx.stats.snapshot().moved, 40);
        assert_eq!(fs::read_dir(&dst).unwrap().count(), 40);
        assert!(dst.join("same_39.txt").exists());
    }
}
