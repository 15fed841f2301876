//! Run configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::FlattenError;
use crate::filter::{FilterPolicy, FilterSpec};

/// Policy for a destination name that is already taken.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum CollisionMode {
    /// Pick a fresh name: `stem_1.ext`, `stem_2.ext`, ...
    #[default]
    Rename,
    /// Leave the source where it is.
    Skip,
    /// Replace the existing destination entry.
    Overwrite,
}

/// Configuration for a flatten run.
///
/// Built once before traversal starts and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct FlattenConfig {
    /// Root of the tree to flatten.
    pub source: PathBuf,

    /// Directory that receives every relocated file.
    pub destination: PathBuf,

    /// How to handle name collisions in the destination.
    #[builder(default)]
    #[serde(default)]
    pub mode: CollisionMode,

    /// Minimum depth of files to relocate. Depth 0 is the source root itself,
    /// so the default of 1 leaves top-level files in place.
    #[builder(default = "1")]
    #[serde(default = "default_min_depth")]
    pub min_depth: usize,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    /// Report what would happen without touching the filesystem.
    #[builder(default = "false")]
    #[serde(default)]
    pub dry_run: bool,

    /// Number of relocation worker threads.
    #[builder(default = "1")]
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Copy access/modification times when falling back to copy.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub preserve_timestamps: bool,

    /// Report byte progress while copying across devices.
    #[builder(default = "false")]
    #[serde(default)]
    pub progress: bool,

    /// Relocate symbolic links (recreated in the destination).
    #[builder(default = "false")]
    #[serde(default)]
    pub include_symlinks: bool,

    /// Remove directories left empty in the source afterwards.
    #[builder(default = "false")]
    #[serde(default)]
    pub prune_empty_dirs: bool,

    /// Remove a partially written destination when a copy fails.
    #[builder(default = "false")]
    #[serde(default)]
    pub cleanup_partial: bool,

    /// File selection filters.
    #[builder(default)]
    #[serde(default)]
    pub filters: FilterSpec,
}

fn default_true() -> bool {
    true
}

fn default_min_depth() -> usize {
    1
}

fn default_threads() -> usize {
    1
}

impl FlattenConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.source {
            Some(ref source) if source.as_os_str().is_empty() => {
                return Err("Source path cannot be empty".to_string());
            }
            None => return Err("Source path is required".to_string()),
            _ => {}
        }
        match self.destination {
            Some(ref destination) if destination.as_os_str().is_empty() => {
                return Err("Destination path cannot be empty".to_string());
            }
            None => return Err("Destination path is required".to_string()),
            _ => {}
        }
        if self.threads == Some(0) {
            return Err("Thread count must be at least 1".to_string());
        }
        if let Some(Some(max)) = self.max_depth {
            let min = self.min_depth.unwrap_or_else(default_min_depth);
            if min > max {
                return Err(format!("Minimum depth {min} exceeds maximum depth {max}"));
            }
        }
        if let Some(ref filters) = self.filters {
            FilterPolicy::compile(filters).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl FlattenConfig {
    /// Create a new config builder.
    pub fn builder() -> FlattenConfigBuilder {
        FlattenConfigBuilder::default()
    }

    /// Create a config with default options.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode: CollisionMode::Rename,
            min_depth: 1,
            max_depth: None,
            dry_run: false,
            threads: 1,
            preserve_timestamps: true,
            progress: false,
            include_symlinks: false,
            prune_empty_dirs: false,
            cleanup_partial: false,
            filters: FilterSpec::default(),
        }
    }

    /// Worker count, never below one.
    pub fn worker_count(&self) -> usize {
        self.threads.max(1)
    }

    /// Check whether a file found at `depth` is deep enough to relocate.
    pub fn accepts_file_depth(&self, depth: usize) -> bool {
        depth >= self.min_depth && self.max_depth.is_none_or(|max| depth <= max)
    }

    /// Check whether the walker may descend out of a directory listed at `depth`.
    pub fn may_descend_from(&self, depth: usize) -> bool {
        self.max_depth.is_none_or(|max| depth < max)
    }

    /// Re-check the builder rules for a config assembled by hand or
    /// deserialized from a file.
    pub fn validate(&self) -> Result<(), FlattenError> {
        if self.source.as_os_str().is_empty() {
            return Err(FlattenError::config("Source path cannot be empty"));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(FlattenError::config("Destination path cannot be empty"));
        }
        if self.threads == 0 {
            return Err(FlattenError::config("Thread count must be at least 1"));
        }
        if let Some(max) = self.max_depth
            && self.min_depth > max
        {
            return Err(FlattenError::config(format!(
                "Minimum depth {} exceeds maximum depth {max}",
                self.min_depth
            )));
        }
        FilterPolicy::compile(&self.filters).map(|_| ())
    }
}
