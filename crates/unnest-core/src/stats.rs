//! Run statistics shared by all workers.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Files relocated successfully.
    pub moved: u64,
    /// Files left in place (name taken under `skip`, or dry-run).
    pub skipped: u64,
    /// Files whose relocation failed.
    pub failed: u64,
    /// Bytes written by the cross-device copy fallback.
    pub bytes_copied: u64,
}

/// Race-free counters mutated by every worker.
///
/// Each update takes one short lock so readers never observe a torn
/// combination of counters.
#[derive(Debug, Default)]
pub struct RunStats {
    inner: Mutex<StatsSnapshot>,
}

impl RunStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful relocation; `bytes_copied` is zero for a rename.
    pub fn record_moved(&self, bytes_copied: u64) {
        let mut inner = self.inner.lock();
        inner.moved += 1;
        inner.bytes_copied += bytes_copied;
    }

    /// Record a file left in place.
    pub fn record_skipped(&self) {
        self.inner.lock().skipped += 1;
    }

    /// Record a failed relocation.
    pub fn record_failed(&self) {
        self.inner.lock().failed += 1;
    }

    /// Read all counters at once.
    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.lock()
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Files relocated successfully.
    pub moved: u64,
    /// Files left in place.
    pub skipped: u64,
    /// Files whose relocation failed.
    pub failed: u64,
    /// Bytes written by the cross-device copy fallback.
    pub bytes_copied: u64,
    /// Empty source directories removed afterwards.
    pub pruned_dirs: u64,
    /// Non-fatal warnings raised while walking.
    pub warnings: u64,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Build a summary from a final snapshot.
    pub fn new(
        stats: StatsSnapshot,
        pruned_dirs: u64,
        warnings: u64,
        dry_run: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            moved: stats.moved,
            skipped: stats.skipped,
            failed: stats.failed,
            bytes_copied: stats.bytes_copied,
            pruned_dirs,
            warnings,
            dry_run,
            elapsed,
        }
    }

    /// Check if every relocation succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// The one-line summary printed at the end of a run.
    pub fn summary(&self) -> String {
        format!(
            "Done. Moved: {}, Skipped: {}, Failed: {}, Bytes copied: {}",
            self.moved, self.skipped, self.failed, self.bytes_copied
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters() {
        let stats = RunStats::new();
        stats.record_moved(0);
        stats.record_moved(128);
        stats.record_skipped();
        stats.record_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.moved, 2);
        assert_eq!(snap.skipped, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.bytes_copied, 128);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(RunStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_moved(2);
                        stats.record_skipped();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.moved, 8000);
        assert_eq!(snap.skipped, 8000);
        assert_eq!(snap.bytes_copied, 16000);
    }

    #[test]
    fn test_summary_line() {
        let snap = StatsSnapshot {
            moved: 3,
            skipped: 1,
            failed: 0,
            bytes_copied: 42,
        };
        let summary = RunSummary::new(snap, 0, 0, false, Duration::ZERO);
        assert!(summary.is_success());
        assert_eq!(
            summary.summary(),
            "Done. Moved: 3, Skipped: 1, Failed: 0, Bytes copied: 42"
        );
    }
}
