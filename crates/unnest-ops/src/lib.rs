//! Relocation engine for unnest.
//!
//! This crate turns the jobs produced by `unnest-scan` into filesystem
//! changes: it picks collision-free names, moves files (falling back to a
//! streamed copy across devices), runs the worker pool, and prunes emptied
//! source directories.
//!
//! # Example
//!
//! ```rust,no_run
//! use unnest_core::{CollisionMode, FlattenConfig};
//! use unnest_ops::Flattener;
//!
//! let config = FlattenConfig::builder()
//!     .source("/data/photos")
//!     .destination("/data/flat")
//!     .mode(CollisionMode::Rename)
//!     .threads(4usize)
//!     .build()
//!     .unwrap();
//!
//! let summary = Flattener::new(config).unwrap().run().unwrap();
//! println!("{}", summary.summary());
//! ```

mod allocator;
mod executor;
mod pool;
mod prune;
mod relocate;

pub use allocator::UniqueNameAllocator;
pub use executor::Flattener;
pub use pool::{WorkerContext, WorkerPool};
pub use prune::EmptyDirPruner;
pub use relocate::{COPY_BUFFER_SIZE, RelocateOptions, Relocation, Relocator};

// Re-export core types for convenience
pub use unnest_core::{CollisionMode, FlattenConfig, FlattenError, RelocateError, RunSummary};
