//! Error types for flattening runs.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a run before any file is relocated.
#[derive(Debug, Error)]
pub enum FlattenError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A root path exists but is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The destination directory could not be created.
    #[error("Cannot create destination {path}: {source}")]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The destination exists but cannot be written to.
    #[error("No write permission in destination: {path}")]
    DestinationNotWritable { path: PathBuf },

    /// The destination is the source itself or one of its ancestors.
    #[error("Destination {destination} contains the source {source_root}")]
    DestinationContainsSource {
        source_root: PathBuf,
        destination: PathBuf,
    },

    /// A constructed path exceeds the supported length.
    #[error("Path too long ({len} bytes): {path}")]
    PathTooLong { path: PathBuf, len: usize },

    /// A glob pattern failed to compile.
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The job queue was closed while the walk was still producing.
    #[error("Operation interrupted")]
    Interrupted,
}

impl FlattenError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an invalid configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Failure to relocate a single job. Counted and logged, never fatal.
#[derive(Debug, Error)]
pub enum RelocateError {
    /// The atomic rename failed for a reason other than crossing devices.
    #[error("rename to {target} failed: {source}")]
    Rename {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the source metadata before a copy failed.
    #[error("cannot stat source: {source}")]
    Stat {
        #[source]
        source: io::Error,
    },

    /// The cross-device copy failed part way.
    #[error("copy to {target} failed: {source}")]
    Copy {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The destination was written but the source could not be removed.
    #[error("cannot remove source: {source}")]
    RemoveSource {
        #[source]
        source: io::Error,
    },

    /// The symbolic link target could not be read.
    #[error("cannot read link: {source}")]
    ReadLink {
        #[source]
        source: io::Error,
    },

    /// Creating the replacement symbolic link failed.
    #[error("cannot create symlink at {target}: {source}")]
    Symlink {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The computed target path is longer than supported.
    #[error("target path too long ({len} bytes): {target}")]
    PathTooLong { target: PathBuf, len: usize },

    /// Symbolic links cannot be recreated on this platform.
    #[error("symbolic links are not supported on this platform")]
    Unsupported,
}

impl RelocateError {
    /// The underlying system error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Rename { source, .. }
            | Self::Stat { source }
            | Self::Copy { source, .. }
            | Self::RemoveSource { source }
            | Self::ReadLink { source }
            | Self::Symlink { source, .. } => Some(source),
            Self::PathTooLong { .. } | Self::Unsupported => None,
        }
    }
}

/// Kind of walk warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A directory could not be opened or listed.
    ReadError,
    /// An entry's metadata could not be read.
    MetadataError,
    /// A directory's real path could not be resolved.
    UnresolvedPath,
}

/// Non-fatal warning encountered while walking the source tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl WalkWarning {
    /// Create a new walk warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: impl std::fmt::Display) -> Self {
        let path = path.into();
        Self {
            message: format!("cannot open '{}' ({error})", path.display()),
            path,
            kind: WarningKind::ReadError,
        }
    }

    /// Create a metadata error warning.
    pub fn metadata_error(path: impl Into<PathBuf>, error: &io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("lstat failed for '{}' ({error})", path.display()),
            path,
            kind: WarningKind::MetadataError,
        }
    }

    /// Create an unresolved path warning.
    pub fn unresolved(path: impl Into<PathBuf>, error: &io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("realpath failed for '{}' ({error})", path.display()),
            path,
            kind: WarningKind::UnresolvedPath,
        }
    }
}

impl std::fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_error_io() {
        let err = FlattenError::io(
            "/test/path",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, FlattenError::PermissionDenied { .. }));

        let err = FlattenError::io("/missing", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, FlattenError::NotFound { .. }));
    }

    #[test]
    fn test_relocate_error_keeps_source() {
        let err = RelocateError::Copy {
            target: PathBuf::from("/dst/a.txt"),
            source: io::Error::other("disk full"),
        };
        assert!(err.to_string().contains("/dst/a.txt"));
        assert_eq!(err.io_error().map(|e| e.to_string()), Some("disk full".into()));
        assert!(RelocateError::Unsupported.io_error().is_none());
    }

    #[test]
    fn test_walk_warning_creation() {
        let warning = WalkWarning::read_error("/test/path", "Permission denied");
        assert_eq!(warning.kind, WarningKind::ReadError);
        assert!(warning.message.contains("cannot open '/test/path'"));
    }
}
