//! Relocation jobs.

use std::ffi::OsStr;
use std::path::PathBuf;

/// One file or symlink selected for relocation.
///
/// Created by the walker and owned by whichever worker dequeues it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Absolute path of the entry in the source tree.
    pub source: PathBuf,
    /// Path relative to the source root.
    pub relative: PathBuf,
    /// Depth at which the entry was discovered (0 = directly in the root).
    pub depth: usize,
    /// The entry is a symbolic link, not a regular file.
    pub is_symlink: bool,
}

impl Job {
    /// Create a job for a regular file.
    pub fn file(source: impl Into<PathBuf>, relative: impl Into<PathBuf>, depth: usize) -> Self {
        Self {
            source: source.into(),
            relative: relative.into(),
            depth,
            is_symlink: false,
        }
    }

    /// Create a job for a symbolic link.
    pub fn symlink(source: impl Into<PathBuf>, relative: impl Into<PathBuf>, depth: usize) -> Self {
        Self {
            is_symlink: true,
            ..Self::file(source, relative, depth)
        }
    }

    /// The entry's own name, which becomes its name in the destination.
    pub fn file_name(&self) -> &OsStr {
        self.relative
            .file_name()
            .unwrap_or(self.relative.as_os_str())
    }
}
