//! Leveled reporting collaborator.
//!
//! Components never log through ambient state; they receive an
//! `Arc<dyn Reporter>` and speak through it. [`TracingReporter`] forwards to
//! `tracing`, [`MemoryReporter`] records messages for inspection.

use std::path::Path;

use parking_lot::Mutex;
use tracing::Level;

/// Sink for log lines and copy progress.
pub trait Reporter: Send + Sync {
    /// Emit one message at `level`.
    fn log(&self, level: Level, message: &str);

    /// Byte progress of a cross-device copy.
    fn copy_progress(&self, path: &Path, copied: u64, total: u64) {
        if total > 0 {
            let pct = copied as f64 * 100.0 / total as f64;
            self.log(
                Level::INFO,
                &format!("  copied {copied}/{total} bytes ({pct:.0}%) {}", path.display()),
            );
        }
    }

    /// Emit at `ERROR`.
    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    /// Emit at `WARN`.
    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    /// Emit at `INFO`.
    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    /// Emit at `DEBUG`.
    fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }
}

/// Forwards every message to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn log(&self, level: Level, message: &str) {
        if level == Level::ERROR {
            tracing::error!("{message}");
        } else if level == Level::WARN {
            tracing::warn!("{message}");
        } else if level == Level::INFO {
            tracing::info!("{message}");
        } else if level == Level::DEBUG {
            tracing::debug!("{message}");
        } else {
            tracing::trace!("{message}");
        }
    }
}

/// Records messages in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded messages, in order.
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().clone()
    }

    /// Messages recorded at exactly `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Check if any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn log(&self, level: Level, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_levels() {
        let reporter = MemoryReporter::new();
        reporter.info("hello");
        reporter.warn("careful");
        reporter.debug("details");

        assert_eq!(reporter.entries().len(), 3);
        assert_eq!(reporter.messages_at(Level::WARN), vec!["careful".to_string()]);
        assert!(reporter.contains("details"));
        assert!(!reporter.contains("missing"));
    }

    #[test]
    fn test_copy_progress_percentage() {
        let reporter = MemoryReporter::new();
        reporter.copy_progress(Path::new("/tmp/a.bin"), 50, 200);
        reporter.copy_progress(Path::new("/tmp/empty"), 0, 0);

        let info = reporter.messages_at(Level::INFO);
        assert_eq!(info.len(), 1);
        assert!(info[0].contains("copied 50/200 bytes (25%)"));
    }
}
