//! Run orchestration: preflight, walk, relocate, prune.

use std::sync::Arc;
use std::time::Instant;

use unnest_core::{
    FilterPolicy, FlattenConfig, FlattenError, Reporter, RootPaths, RunStats, RunSummary,
    TracingReporter,
};
use unnest_scan::{DirectoryWalker, JobQueue};

use crate::allocator::UniqueNameAllocator;
use crate::pool::{WorkerContext, WorkerPool};
use crate::prune::EmptyDirPruner;
use crate::relocate::{RelocateOptions, Relocator};

/// One configured flattening run.
///
/// Construction performs every fatal check; [`run`](Self::run) then walks
/// the source tree on the calling thread while the worker pool relocates.
pub struct Flattener {
    config: Arc<FlattenConfig>,
    roots: RootPaths,
    filter: Arc<FilterPolicy>,
    reporter: Arc<dyn Reporter>,
}

impl Flattener {
    /// Validate `config` and resolve the roots, logging through `tracing`.
    ///
    /// Creates the destination directory unless this is a dry run.
    pub fn new(config: FlattenConfig) -> Result<Self, FlattenError> {
        Self::with_reporter(config, Arc::new(TracingReporter))
    }

    /// Like [`new`](Self::new) with a custom reporter.
    pub fn with_reporter(
        config: FlattenConfig,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, FlattenError> {
        config.validate()?;
        let filter = FilterPolicy::compile(&config.filters)?;
        let roots = RootPaths::resolve(&config)?;

        Ok(Self {
            config: Arc::new(config),
            roots,
            filter: Arc::new(filter),
            reporter,
        })
    }

    /// The resolved source and destination.
    pub fn roots(&self) -> &RootPaths {
        &self.roots
    }

    /// The validated configuration.
    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }

    /// Flatten the tree and return the final counts.
    ///
    /// Per-file failures are counted, never returned. An error means the walk
    /// itself failed; pending jobs are then discarded and the workers joined
    /// before returning.
    pub fn run(&self) -> Result<RunSummary, FlattenError> {
        let start = Instant::now();
        self.log_banner();

        let queue = Arc::new(JobQueue::new());
        let stats = Arc::new(RunStats::new());
        let context = Arc::new(WorkerContext {
            destination: self.roots.destination.clone(),
            mode: self.config.mode,
            dry_run: self.config.dry_run,
            allocator: Arc::new(UniqueNameAllocator::new()),
            relocator: Arc::new(Relocator::new(
                RelocateOptions::from(self.config.as_ref()),
                Arc::clone(&self.reporter),
            )),
            stats: Arc::clone(&stats),
            reporter: Arc::clone(&self.reporter),
        });

        let pool = WorkerPool::start(self.config.worker_count(), Arc::clone(&queue), context)?;

        let walker = DirectoryWalker::new(
            Arc::clone(&self.config),
            self.roots.clone(),
            Arc::clone(&self.filter),
            Arc::clone(&self.reporter),
        );
        let walk = match walker.walk(&queue) {
            Ok(walk) => {
                queue.signal_done();
                walk
            }
            Err(e) => {
                let discarded = queue.abort();
                pool.join();
                self.reporter
                    .error(&format!("Walk aborted, {discarded} pending job(s) discarded: {e}"));
                return Err(e);
            }
        };

        let processed = pool.join();
        self.reporter.debug(&format!(
            "Walk finished: {} directories, {} entries, {} queued, {} filtered; {} processed",
            walk.dirs_visited, walk.entries_seen, walk.jobs_queued, walk.filtered_out, processed
        ));

        let pruned = if self.config.prune_empty_dirs && !self.config.dry_run {
            EmptyDirPruner::new(&self.roots, Arc::clone(&self.reporter)).prune()
        } else {
            0
        };

        Ok(RunSummary::new(
            stats.snapshot(),
            pruned,
            walk.warnings,
            self.config.dry_run,
            start.elapsed(),
        ))
    }

    fn log_banner(&self) {
        self.reporter
            .info(&format!("Source: '{}'", self.roots.source.display()));
        self.reporter
            .info(&format!("Destination: '{}'", self.roots.destination.display()));
        if self.roots.destination_inside_source() {
            self.reporter
                .info("Note: destination is inside source; it will be skipped during traversal");
        }
        if self.config.dry_run {
            self.reporter.info("Dry run: no files will be changed");
        }
    }
}
