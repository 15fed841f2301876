//! Source tree traversal for unnest.
//!
//! This crate provides the producer half of a flattening run: a
//! [`DirectoryWalker`] that visits the source tree with jwalk, and the
//! [`JobQueue`] it feeds.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unnest_core::{FilterPolicy, FlattenConfig, RootPaths, TracingReporter};
//! use unnest_scan::{DirectoryWalker, JobQueue};
//!
//! let config = FlattenConfig::new("/data/in", "/data/out");
//! let roots = RootPaths::resolve(&config).unwrap();
//! let filter = Arc::new(FilterPolicy::compile(&config.filters).unwrap());
//! let walker = DirectoryWalker::new(Arc::new(config), roots, filter, Arc::new(TracingReporter));
//!
//! let queue = JobQueue::new();
//! let stats = walker.walk(&queue).unwrap();
//! queue.signal_done();
//!
//! println!("Queued {} jobs", stats.jobs_queued);
//! ```

mod queue;
mod walker;

pub use queue::{JobQueue, QueueClosed, QueueStats};
pub use walker::{DirectoryWalker, WalkStats};
