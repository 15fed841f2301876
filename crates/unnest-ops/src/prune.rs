//! Removal of source directories left empty after a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use unnest_core::{Reporter, RootPaths, is_within};

/// Bottom-up remover of empty directories in the source tree.
///
/// Never removes the source root, never enters the destination subtree, and
/// never follows symlinks to directories.
pub struct EmptyDirPruner {
    source: PathBuf,
    destination: PathBuf,
    reporter: Arc<dyn Reporter>,
}

impl EmptyDirPruner {
    /// Create a pruner for the given roots.
    pub fn new(roots: &RootPaths, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            source: roots.source.clone(),
            destination: roots.destination.clone(),
            reporter,
        }
    }

    /// Prune below the source root. Returns how many directories were removed.
    pub fn prune(&self) -> u64 {
        let removed = self.prune_below(&self.source);
        self.reporter
            .info(&format!("Removed {removed} empty director{}", plural(removed)));
        removed
    }

    fn prune_below(&self, dir: &Path) -> u64 {
        let Ok(entries) = fs::read_dir(dir) else {
            return 0;
        };
        // Collect first so removals do not race the directory stream.
        let subdirs: Vec<PathBuf> = entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.path())
            .collect();

        let mut removed = 0;
        for subdir in subdirs {
            match fs::canonicalize(&subdir) {
                Ok(real) if is_within(&real, &self.destination) => continue,
                Ok(_) => {}
                Err(_) => continue,
            }

            removed += self.prune_below(&subdir);

            if is_empty_dir(&subdir) && fs::remove_dir(&subdir).is_ok() {
                self.reporter
                    .debug(&format!("Removed empty directory '{}'", subdir.display()));
                removed += 1;
            }
        }
        removed
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

fn plural(n: u64) -> &'static str {
    if n == 1 { "y" } else { "ies" }
}
