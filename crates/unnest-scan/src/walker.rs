//! JWalk-based source tree walker.
//!
//! The walker is the single producer: it visits the source tree in one
//! thread, applies depth and filter rules, and feeds [`Job`]s into the
//! [`JobQueue`] while workers drain it concurrently.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use jwalk::{Parallelism, WalkDir};
use serde::Serialize;

use unnest_core::{
    EntryStat, FilterPolicy, FlattenConfig, FlattenError, Job, Reporter, RootPaths, WalkWarning,
    check_path_len,
};

use crate::queue::JobQueue;

/// Counters produced by one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Directories whose children were listed, including the root.
    pub dirs_visited: u64,
    /// Entries examined below the root.
    pub entries_seen: u64,
    /// Jobs handed to the queue.
    pub jobs_queued: u64,
    /// Files rejected by the filter engine.
    pub filtered_out: u64,
    /// Warnings reported during the walk.
    pub warnings: u64,
}

/// Walks the source tree and enqueues relocation jobs.
pub struct DirectoryWalker {
    config: Arc<FlattenConfig>,
    roots: RootPaths,
    filter: Arc<FilterPolicy>,
    reporter: Arc<dyn Reporter>,
}

impl DirectoryWalker {
    /// Create a walker over already resolved roots.
    pub fn new(
        config: Arc<FlattenConfig>,
        roots: RootPaths,
        filter: Arc<FilterPolicy>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config,
            roots,
            filter,
            reporter,
        }
    }

    /// Walk the source tree, pushing every selected entry onto `queue`.
    ///
    /// Unreadable directories and entries are reported as warnings and
    /// skipped. A fatal error stops the walk; the caller owns the queue and
    /// decides whether to signal done or abort.
    pub fn walk(&self, queue: &JobQueue) -> Result<WalkStats, FlattenError> {
        let mut stats = WalkStats::default();
        let hook_warnings = Arc::new(AtomicU64::new(0));

        let walker = WalkDir::new(&self.roots.source)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .process_read_dir({
                let config = Arc::clone(&self.config);
                let destination = self.roots.destination.clone();
                let reporter = Arc::clone(&self.reporter);
                let warnings = Arc::clone(&hook_warnings);
                move |_, _, _, children| {
                    for child in children.iter_mut() {
                        let Ok(entry) = child else { continue };
                        // jwalk depth 0 is the root itself
                        if entry.depth() == 0 || !entry.file_type().is_dir() {
                            continue;
                        }
                        let path = entry.path();
                        let descend = match fs::canonicalize(&path) {
                            Ok(real) if real.starts_with(&destination) => {
                                reporter.debug(&format!(
                                    "Skipping destination subtree '{}'",
                                    path.display()
                                ));
                                false
                            }
                            Ok(_) => config.may_descend_from(entry.depth() - 1),
                            Err(e) => {
                                reporter.warn(&WalkWarning::unresolved(&path, &e).to_string());
                                warnings.fetch_add(1, Ordering::Relaxed);
                                false
                            }
                        };
                        if !descend {
                            entry.read_children_path = None;
                        }
                    }
                }
            });

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    self.warn(&mut stats, WalkWarning::read_error(path, &err));
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if let Some(err) = &entry.read_children_error {
                    self.warn(&mut stats, WalkWarning::read_error(entry.path(), err));
                } else if entry.read_children_path.is_some() {
                    stats.dirs_visited += 1;
                }
            }
            if entry.depth() == 0 {
                continue;
            }

            stats.entries_seen += 1;
            if file_type.is_dir() {
                continue;
            }

            let depth = entry.depth() - 1;
            let path = entry.path();
            check_path_len(&path)?;

            let is_symlink = file_type.is_symlink();
            if is_symlink && !self.config.include_symlinks {
                continue;
            }
            if !is_symlink && !file_type.is_file() {
                // fifos, sockets, devices
                continue;
            }
            if !self.config.accepts_file_depth(depth) {
                continue;
            }

            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    self.warn(&mut stats, WalkWarning::metadata_error(&path, &e));
                    continue;
                }
            };

            let relative = relative_to(&path, &self.roots.source);
            let name = entry.file_name().to_string_lossy();
            if !self
                .filter
                .passes(&relative, &EntryStat::from_metadata(&metadata), &name)
            {
                stats.filtered_out += 1;
                continue;
            }

            let job = if is_symlink {
                Job::symlink(path, relative, depth)
            } else {
                Job::file(path, relative, depth)
            };
            queue.push(job).map_err(|_| FlattenError::Interrupted)?;
            stats.jobs_queued += 1;
        }

        stats.warnings += hook_warnings.load(Ordering::Relaxed);
        Ok(stats)
    }

    fn warn(&self, stats: &mut WalkStats, warning: WalkWarning) {
        self.reporter.warn(&format!("Warning: {warning}"));
        stats.warnings += 1;
    }
}

fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use unnest_core::{FilterSpec, MemoryReporter};

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("src");

        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();
        fs::write(root.join("top.txt"), "top").unwrap();
        fs::write(root.join("a/one.txt"), "one").unwrap();
        fs::write(root.join("a/one.log"), "one log").unwrap();
        fs::write(root.join("a/b/two.txt"), "two").unwrap();
        fs::write(root.join("c/three.txt"), "three").unwrap();

        temp
    }

    fn walk(config: FlattenConfig) -> (Vec<Job>, WalkStats, Arc<MemoryReporter>) {
        let roots = RootPaths::resolve(&config).unwrap();
        let filter = Arc::new(FilterPolicy::compile(&config.filters).unwrap());
        let reporter = Arc::new(MemoryReporter::new());
        let walker = DirectoryWalker::new(Arc::new(config), roots, filter, reporter.clone());

        let queue = JobQueue::new();
        let stats = walker.walk(&queue).unwrap();
        queue.signal_done();

        let jobs = std::iter::from_fn(|| queue.pop()).collect();
        (jobs, stats, reporter)
    }

    fn relatives(jobs: &[Job]) -> Vec<String> {
        let mut names: Vec<_> = jobs
            .iter()
            .map(|j| j.relative.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_default_depths_skip_top_level() {
        let temp = create_test_tree();
        let config = FlattenConfig::new(temp.path().join("src"), temp.path().join("out"));

        let (jobs, stats, _) = walk(config);

        assert_eq!(
            relatives(&jobs),
            ["a/b/two.txt", "a/one.log", "a/one.txt", "c/three.txt"]
        );
        assert_eq!(stats.jobs_queued, 4);
        assert_eq!(stats.dirs_visited, 4);
        assert_eq!(stats.warnings, 0);
        let deep = jobs.iter().find(|j| j.relative.ends_with("two.txt")).unwrap();
        assert_eq!(deep.depth, 2);
        assert!(deep.source.is_absolute());
    }

    #[test]
    fn test_min_depth_zero_includes_top_level() {
        let temp = create_test_tree();
        let mut config = FlattenConfig::new(temp.path().join("src"), temp.path().join("out"));
        config.min_depth = 0;

        let (jobs, _, _) = walk(config);

        assert!(relatives(&jobs).contains(&"top.txt".to_string()));
        assert_eq!(jobs.len(), 5);
    }

    #[test]
    fn test_max_depth_stops_recursion() {
        let temp = create_test_tree();
        let mut config = FlattenConfig::new(temp.path().join("src"), temp.path().join("out"));
        config.max_depth = Some(1);

        let (jobs, stats, _) = walk(config);

        assert_eq!(relatives(&jobs), ["a/one.log", "a/one.txt", "c/three.txt"]);
        // a/b is listed but never read
        assert_eq!(stats.dirs_visited, 3);
    }

    #[test]
    fn test_filters_are_applied() {
        let temp = create_test_tree();
        let mut config = FlattenConfig::new(temp.path().join("src"), temp.path().join("out"));
        config.filters = FilterSpec {
            deny_ext: vec!["log".into()],
            ..Default::default()
        };

        let (jobs, stats, _) = walk(config);

        assert_eq!(relatives(&jobs), ["a/b/two.txt", "a/one.txt", "c/three.txt"]);
        assert_eq!(stats.filtered_out, 1);
    }

    #[test]
    fn test_destination_inside_source_is_skipped() {
        let temp = create_test_tree();
        let source = temp.path().join("src");
        fs::create_dir_all(source.join("flat")).unwrap();
        fs::write(source.join("flat/already.txt"), "here").unwrap();

        let (jobs, _, reporter) = walk(FlattenConfig::new(&source, source.join("flat")));

        assert!(!relatives(&jobs).iter().any(|r| r.starts_with("flat")));
        assert_eq!(jobs.len(), 4);
        assert!(reporter.contains("Skipping destination subtree"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_need_opt_in() {
        let temp = create_test_tree();
        let source = temp.path().join("src");
        std::os::unix::fs::symlink("../top.txt", source.join("a/link")).unwrap();

        let (jobs, _, _) = walk(FlattenConfig::new(&source, temp.path().join("out")));
        assert!(jobs.iter().all(|j| !j.is_symlink));

        let mut config = FlattenConfig::new(&source, temp.path().join("out"));
        config.include_symlinks = true;
        let (jobs, _, _) = walk(config);
        let link = jobs.iter().find(|j| j.is_symlink).unwrap();
        assert_eq!(link.relative, Path::new("a/link"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_not_followed() {
        let temp = create_test_tree();
        let source = temp.path().join("src");
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(&outside, source.join("a/ext")).unwrap();

        let (jobs, _, _) = walk(FlattenConfig::new(&source, temp.path().join("out")));

        assert!(!relatives(&jobs).iter().any(|r| r.contains("secret")));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_warns_and_continues() {
        use std::os::unix::fs::PermissionsExt;

        // Directory permissions do not apply to root.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let temp = create_test_tree();
        let source = temp.path().join("src");
        let locked = source.join("c");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let (jobs, stats, reporter) = walk(FlattenConfig::new(&source, temp.path().join("out")));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(stats.warnings, 1);
        assert_eq!(
            relatives(&jobs),
            ["a/b/two.txt", "a/one.log", "a/one.txt"]
        );
        assert!(reporter.contains("cannot open"));
    }
}
