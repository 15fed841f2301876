//! Job queue between the walker and the relocation workers.
//!
//! Unbounded FIFO with a one-shot completion signal. The walker is the only
//! producer; any number of workers block in [`JobQueue::pop`] until a job
//! arrives or the walk is over.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use thiserror::Error;

use unnest_core::Job;

/// Returned by [`JobQueue::push`] once the queue is done; hands the job back.
#[derive(Debug, Error)]
#[error("job queue is closed")]
pub struct QueueClosed(pub Job);

/// Counters for queue traffic.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total jobs enqueued.
    pub enqueued: AtomicU64,
    /// Total jobs handed to workers.
    pub dequeued: AtomicU64,
    /// Jobs dropped by [`JobQueue::abort`].
    pub discarded: AtomicU64,
}

/// FIFO of relocation jobs with a done signal.
///
/// Dropping the only sender is the done signal: the channel keeps delivering
/// buffered jobs and reports disconnection only once it is empty, which is
/// exactly "permanently empty, exit".
#[derive(Debug)]
pub struct JobQueue {
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    stats: QueueStats,
}

impl JobQueue {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            stats: QueueStats::default(),
        }
    }

    /// Append a job. Never blocks; wakes one waiting worker.
    pub fn push(&self, job: Job) -> Result<(), QueueClosed> {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(QueueClosed(job));
        };
        tx.send(job).map_err(|e| QueueClosed(e.into_inner()))?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Take the oldest job, blocking while the queue is empty but still open.
    ///
    /// Returns `None` once the queue is done and drained.
    pub fn pop(&self) -> Option<Job> {
        let job = self.receiver.recv().ok()?;
        self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
        Some(job)
    }

    /// Announce that no more jobs will be pushed. Irreversible.
    pub fn signal_done(&self) {
        self.sender.lock().take();
    }

    /// Signal done and discard every job not yet taken.
    ///
    /// Returns the number of jobs discarded.
    pub fn abort(&self) -> usize {
        self.signal_done();
        let discarded = self.receiver.try_iter().count();
        self.stats
            .discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        discarded
    }

    /// Check whether [`signal_done`](Self::signal_done) has been called.
    pub fn is_done(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Number of jobs waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if no job is waiting.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Queue traffic counters.
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
