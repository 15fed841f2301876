//! Root path resolution and subtree containment.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::FlattenConfig;
use crate::error::FlattenError;

/// Longest path, in bytes, the tool will construct.
pub const MAX_PATH_LEN: usize = 4096;

/// Fail if `path` is longer than [`MAX_PATH_LEN`].
pub fn check_path_len(path: &Path) -> Result<(), FlattenError> {
    let len = path.as_os_str().len();
    if len > MAX_PATH_LEN {
        return Err(FlattenError::PathTooLong {
            path: path.to_path_buf(),
            len,
        });
    }
    Ok(())
}

/// Check whether `path` equals `root` or lies below it.
///
/// Comparison is per component, so `/data/out2` is not within `/data/out`.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Canonical source and destination roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPaths {
    /// Canonical source root.
    pub source: PathBuf,
    /// Canonical destination root.
    pub destination: PathBuf,
}

impl RootPaths {
    /// Resolve both roots and run every fatal preflight check.
    ///
    /// Creates the destination when it is missing, unless this is a dry run,
    /// in which case its would-be canonical path is computed instead.
    pub fn resolve(config: &FlattenConfig) -> Result<Self, FlattenError> {
        let source = config
            .source
            .canonicalize()
            .map_err(|e| FlattenError::io(&config.source, e))?;
        if !source.is_dir() {
            return Err(FlattenError::NotADirectory { path: source });
        }
        check_path_len(&source)?;
        // Before anything is created.
        let requested = std::path::absolute(&config.destination)
            .unwrap_or_else(|_| config.destination.clone());
        check_path_len(&requested)?;

        let destination = resolve_destination(&config.destination, config.dry_run)?;

        if !config.dry_run && !is_writable(&destination) {
            return Err(FlattenError::DestinationNotWritable { path: destination });
        }
        if is_within(&source, &destination) {
            return Err(FlattenError::DestinationContainsSource {
                source_root: source,
                destination,
            });
        }

        check_path_len(&destination)?;

        Ok(Self {
            source,
            destination,
        })
    }

    /// Check if `path` (already canonical) is the destination or inside it.
    pub fn in_destination(&self, path: &Path) -> bool {
        is_within(path, &self.destination)
    }

    /// Check if the destination is nested somewhere inside the source.
    pub fn destination_inside_source(&self) -> bool {
        is_within(&self.destination, &self.source)
    }
}

fn resolve_destination(path: &Path, dry_run: bool) -> Result<PathBuf, FlattenError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(FlattenError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if dry_run {
                return resolve_missing(path);
            }
            fs::create_dir_all(path).map_err(|source| FlattenError::CreateDestination {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Err(e) => return Err(FlattenError::io(path, e)),
    }

    path.canonicalize().map_err(|e| FlattenError::io(path, e))
}

/// Canonicalize the deepest existing ancestor and re-append the rest.
fn resolve_missing(path: &Path) -> Result<PathBuf, FlattenError> {
    let absolute = std::path::absolute(path).map_err(|e| FlattenError::io(path, e))?;
    let mut existing = absolute.as_path();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        if let Ok(base) = existing.canonicalize() {
            return Ok(missing.iter().rev().fold(base, |acc, part| acc.join(part)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => {
                return Err(FlattenError::NotFound {
                    path: path.to_path_buf(),
                });
            }
        }
    }
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    match CString::new(path.as_os_str().as_bytes()) {
        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        Ok(c_path) => unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 },
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
