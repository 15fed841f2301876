//! Moving one file or symlink into the destination.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use serde::{Deserialize, Serialize};

use unnest_core::{CollisionMode, FlattenConfig, Job, RelocateError, Reporter};

/// Size of the buffer used by the cross-device copy.
pub const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// How a job reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relocation {
    /// Atomic rename on the same filesystem.
    Renamed,
    /// Streamed copy followed by removal of the source.
    Copied { bytes: u64 },
    /// Symbolic link recreated at the destination.
    Relinked,
}

impl Relocation {
    /// Bytes written by the copy fallback, zero otherwise.
    pub fn bytes_copied(&self) -> u64 {
        match self {
            Self::Copied { bytes } => *bytes,
            Self::Renamed | Self::Relinked => 0,
        }
    }
}

/// Options for the copy fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocateOptions {
    /// Carry access and modification times over to the copy.
    pub preserve_timestamps: bool,
    /// Report byte progress after every buffer.
    pub progress: bool,
    /// Remove the destination file when a copy fails part way.
    pub cleanup_partial: bool,
}

impl Default for RelocateOptions {
    fn default() -> Self {
        Self {
            preserve_timestamps: true,
            progress: false,
            cleanup_partial: false,
        }
    }
}

impl From<&FlattenConfig> for RelocateOptions {
    fn from(config: &FlattenConfig) -> Self {
        Self {
            preserve_timestamps: config.preserve_timestamps,
            progress: config.progress,
            cleanup_partial: config.cleanup_partial,
        }
    }
}

/// Performs the filesystem side of a relocation.
pub struct Relocator {
    options: RelocateOptions,
    reporter: Arc<dyn Reporter>,
}

impl Relocator {
    /// Create a relocator.
    pub fn new(options: RelocateOptions, reporter: Arc<dyn Reporter>) -> Self {
        Self { options, reporter }
    }

    /// Move `job` to `target`.
    ///
    /// The target has already been chosen for the collision mode; `mode` only
    /// decides whether an existing entry there is replaced first. The source
    /// is removed only after the destination is fully written.
    pub fn relocate(
        &self,
        job: &Job,
        target: &Path,
        mode: CollisionMode,
    ) -> Result<Relocation, RelocateError> {
        if mode == CollisionMode::Overwrite {
            remove_existing(target);
        }

        if job.is_symlink {
            return relink(&job.source, target);
        }

        match fs::rename(&job.source, target) {
            Ok(()) => Ok(Relocation::Renamed),
            Err(e) if is_cross_device(&e) => {
                self.reporter.debug(&format!(
                    "Cross-device move, copying '{}' -> '{}'",
                    job.source.display(),
                    target.display()
                ));
                self.copy_across(&job.source, target)
            }
            Err(source) => Err(RelocateError::Rename {
                target: target.to_path_buf(),
                source,
            }),
        }
    }

    /// Copy `source` to `target`, then remove `source`.
    fn copy_across(&self, source: &Path, target: &Path) -> Result<Relocation, RelocateError> {
        let metadata = fs::metadata(source).map_err(|source| RelocateError::Stat { source })?;
        let copy_error = |source| RelocateError::Copy {
            target: target.to_path_buf(),
            source,
        };

        let mut reader = File::open(source).map_err(copy_error)?;
        let mut writer = create_like(target, &metadata).map_err(copy_error)?;

        let written = self
            .stream(&mut reader, &mut writer, metadata.len(), target)
            .and_then(|bytes| {
                if self.options.preserve_timestamps {
                    filetime::set_file_handle_times(
                        &writer,
                        Some(FileTime::from_last_access_time(&metadata)),
                        Some(FileTime::from_last_modification_time(&metadata)),
                    )?;
                }
                writer.sync_all()?;
                Ok(bytes)
            });

        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(writer);
                if self.options.cleanup_partial {
                    let _ = fs::remove_file(target);
                }
                return Err(copy_error(e));
            }
        };

        fs::remove_file(source).map_err(|source| RelocateError::RemoveSource { source })?;
        Ok(Relocation::Copied { bytes })
    }

    fn stream(
        &self,
        reader: &mut File,
        writer: &mut File,
        total: u64,
        target: &Path,
    ) -> io::Result<u64> {
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            writer.write_all(&buffer[..n])?;
            copied += n as u64;

            if self.options.progress {
                self.reporter.copy_progress(target, copied, total);
            }
        }

        Ok(copied)
    }
}

/// Best effort: a missing entry is fine, a directory is left alone.
fn remove_existing(target: &Path) {
    if let Ok(metadata) = fs::symlink_metadata(target)
        && !metadata.is_dir()
    {
        let _ = fs::remove_file(target);
    }
}

fn create_like(target: &Path, metadata: &Metadata) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(metadata.permissions().mode());
    }
    #[cfg(not(unix))]
    let _ = metadata;

    options.open(target)
}

#[cfg(unix)]
fn relink(source: &Path, target: &Path) -> Result<Relocation, RelocateError> {
    let link_target: PathBuf =
        fs::read_link(source).map_err(|source| RelocateError::ReadLink { source })?;
    std::os::unix::fs::symlink(&link_target, target).map_err(|source| RelocateError::Symlink {
        target: target.to_path_buf(),
        source,
    })?;
    fs::remove_file(source).map_err(|source| RelocateError::RemoveSource { source })?;
    Ok(Relocation::Relinked)
}

#[cfg(not(unix))]
fn relink(_source: &Path, _target: &Path) -> Result<Relocation, RelocateError> {
    Err(RelocateError::Unsupported)
}

fn is_cross_device(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::CrossesDevices {
        return true;
    }
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(not(unix))]
    {
        false
    }
}
