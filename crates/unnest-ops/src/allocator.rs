//! Collision-free destination names.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use unnest_core::{FlattenError, check_path_len};

/// Hands out destination paths that no other worker will receive.
///
/// A path counts as taken if something exists there or if this allocator has
/// already handed it out during the run. The probe and the reservation happen
/// under one lock, so two workers racing for `report.pdf` always end up with
/// `report.pdf` and `report_1.pdf`, even before either file lands on disk.
#[derive(Debug, Default)]
pub struct UniqueNameAllocator {
    reserved: Mutex<HashSet<PathBuf>>,
}

impl UniqueNameAllocator {
    /// Create an allocator with no reservations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the first free path among `dir/name`, `dir/stem_1.ext`,
    /// `dir/stem_2.ext`, ... and reserve it.
    ///
    /// For `notes.tar.gz` the candidates are `notes.tar_1.gz`, `notes.tar_2.gz`;
    /// `.bashrc` has no extension and becomes `.bashrc_1`.
    pub fn allocate(&self, dir: &Path, name: &OsStr) -> Result<PathBuf, FlattenError> {
        let mut reserved = self.reserved.lock();

        let literal = dir.join(name);
        check_path_len(&literal)?;
        if is_free(&literal, &reserved) {
            reserved.insert(literal.clone());
            return Ok(literal);
        }

        let split = Path::new(name);
        let stem = split.file_stem().unwrap_or(name);
        let extension = split.extension();

        let mut counter: u64 = 1;
        loop {
            let candidate = dir.join(numbered_name(stem, extension, counter));
            check_path_len(&candidate)?;
            if is_free(&candidate, &reserved) {
                reserved.insert(candidate.clone());
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    /// Reserve `dir/name` only if nothing is there and nobody claimed it.
    ///
    /// Returns `Ok(None)` when the literal target is taken.
    pub fn claim_literal(&self, dir: &Path, name: &OsStr) -> Result<Option<PathBuf>, FlattenError> {
        let mut reserved = self.reserved.lock();

        let literal = dir.join(name);
        check_path_len(&literal)?;
        if !is_free(&literal, &reserved) {
            return Ok(None);
        }
        reserved.insert(literal.clone());
        Ok(Some(literal))
    }

    /// Give back a path whose relocation failed.
    ///
    /// The on-disk probe still applies, so a partial copy left at `path`
    /// keeps it taken.
    pub fn release(&self, path: &Path) -> bool {
        self.reserved.lock().remove(path)
    }

    /// Number of paths handed out so far.
    pub fn reserved_count(&self) -> usize {
        self.reserved.lock().len()
    }
}

/// Existence is checked with lstat so a dangling symlink still counts.
fn is_free(path: &Path, reserved: &HashSet<PathBuf>) -> bool {
    !reserved.contains(path) && fs::symlink_metadata(path).is_err()
}

fn numbered_name(stem: &OsStr, extension: Option<&OsStr>, counter: u64) -> OsString {
    let mut name = stem.to_os_string();
    name.push(format!("_{counter}"));
    if let Some(ext) = extension {
        name.push(".");
        name.push(ext);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_allocate_free_name_is_literal() {
        let temp = TempDir::new().unwrap();
        let allocator = UniqueNameAllocator::new();

        let path = allocator.allocate(temp.path(), OsStr::new("a.txt")).unwrap();
        assert_eq!(path, temp.path().join("a.txt"));
    }

    #[test]
    fn test_allocate_skips_existing_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();
        fs::write(temp.path().join("a_1.txt"), "x").unwrap();
        let allocator = UniqueNameAllocator::new();

        let path = allocator.allocate(temp.path(), OsStr::new("a.txt")).unwrap();
        assert_eq!(path, temp.path().join("a_2.txt"));
    }

    #[test]
    fn test_allocate_remembers_handed_out_paths() {
        let temp = TempDir::new().unwrap();
        let allocator = UniqueNameAllocator::new();

        let names: Vec<_> = (0..3)
            .map(|_| allocator.allocate(temp.path(), OsStr::new("p.txt")).unwrap())
            .collect();

        assert_eq!(
            names,
            [
                temp.path().join("p.txt"),
                temp.path().join("p_1.txt"),
                temp.path().join("p_2.txt"),
            ]
        );
        assert_eq!(allocator.reserved_count(), 3);
    }

    #[test]
    fn test_allocate_stem_extension_split() {
        let temp = TempDir::new().unwrap();
        for name in [".bashrc", "archive.tar.gz", "README", ".config.toml"] {
            fs::write(temp.path().join(name), "x").unwrap();
        }
        let allocator = UniqueNameAllocator::new();
        let next = |name: &str| {
            allocator
                .allocate(temp.path(), OsStr::new(name))
                .unwrap()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        };

        assert_eq!(next(".bashrc"), ".bashrc_1");
        assert_eq!(next("archive.tar.gz"), "archive.tar_1.gz");
        assert_eq!(next("README"), "README_1");
        assert_eq!(next(".config.toml"), ".config_1.toml");
    }

    #[test]
    fn test_allocate_rejects_long_paths() {
        let temp = TempDir::new().unwrap();
        let allocator = UniqueNameAllocator::new();
        let name = "n".repeat(unnest_core::MAX_PATH_LEN);

        let result = allocator.allocate(temp.path(), OsStr::new(&name));
        assert!(matches!(result, Err(FlattenError::PathTooLong { .. })));
    }

    #[test]
    fn test_claim_literal() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("taken.txt"), "x").unwrap();
        let allocator = UniqueNameAllocator::new();

        assert_eq!(
            allocator
                .claim_literal(temp.path(), OsStr::new("taken.txt"))
                .unwrap(),
            None
        );
        assert_eq!(
            allocator
                .claim_literal(temp.path(), OsStr::new("free.txt"))
                .unwrap(),
            Some(temp.path().join("free.txt"))
        );
        // Second claim loses even though nothing was written yet.
        assert_eq!(
            allocator
                .claim_literal(temp.path(), OsStr::new("free.txt"))
                .unwrap(),
            None
        );

        assert!(allocator.release(&temp.path().join("free.txt")));
        assert_eq!(
            allocator
                .claim_literal(temp.path(), OsStr::new("free.txt"))
                .unwrap(),
            Some(temp.path().join("free.txt"))
        );
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        let allocator = Arc::new(UniqueNameAllocator::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                let dir = dir.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|_| allocator.allocate(&dir, OsStr::new("same.bin")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let all: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
        assert!(unique.contains(&dir.join("same.bin")));
        assert!(unique.contains(&dir.join("same_199.bin")));
    }
}
