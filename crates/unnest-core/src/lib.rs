//! Core types for unnest.
//!
//! This crate provides the data structures shared by the walker and the
//! relocation engine: run configuration, the filter engine, relocation jobs,
//! run statistics, root path resolution, and the reporting trait.

mod config;
mod error;
mod filter;
mod job;
mod paths;
mod report;
mod stats;

pub use config::{CollisionMode, FlattenConfig, FlattenConfigBuilder};
pub use error::{FlattenError, RelocateError, WalkWarning, WarningKind};
pub use filter::{EntryStat, FilterPolicy, FilterSpec, FilterSpecBuilder, extension_of};
pub use job::Job;
pub use paths::{MAX_PATH_LEN, RootPaths, check_path_len, is_within};
pub use report::{MemoryReporter, Reporter, TracingReporter};
pub use stats::{RunStats, RunSummary, StatsSnapshot};

// Re-exported so reporters can be implemented without a direct dependency.
pub use tracing::Level;
