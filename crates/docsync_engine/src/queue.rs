//! FIFO of operations deferred while offline.

use crate::error::SyncResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

/// Future produced by a queued task.
pub type TaskFuture = Pin<Box<dyn Future<Output = SyncResult<()>> + Send>>;

/// A deferred operation, started when the queue is drained.
pub type QueuedTask = Box<dyn FnOnce() -> TaskFuture + Send>;

struct Entry {
    label: &'static str,
    task: QueuedTask,
}

/// Totals of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks that completed successfully.
    pub succeeded: usize,
    /// Tasks that returned an error.
    pub failed: usize,
}

/// In-memory FIFO of operations attempted while offline.
///
/// Draining runs tasks strictly in enqueue order. A failing task is logged
/// and skipped; it never stops the tasks behind it.
pub struct OfflineQueue {
    entries: Mutex<VecDeque<Entry>>,
    capacity: usize,
}

impl OfflineQueue {
    /// Creates a queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Appends a task and returns the new queue length.
    ///
    /// When full, the oldest task is dropped.
    pub fn enqueue(&self, label: &'static str, task: QueuedTask) -> usize {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            if let Some(dropped) = entries.pop_front() {
                tracing::warn!(task = dropped.label, "offline queue full, dropping oldest task");
            }
        }
        entries.push_back(Entry { label, task });
        entries.len()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Discards every queued task.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Runs every queued task in FIFO order.
    pub async fn drain(&self) -> DrainReport {
        self.drain_while(|| true).await
    }

    /// Like [`drain`](Self::drain), but stops before the next task once
    /// `proceed` returns false. Tasks not started stay queued.
    pub async fn drain_while(&self, proceed: impl Fn() -> bool) -> DrainReport {
        let mut report = DrainReport::default();
        while proceed() {
            let next = self.entries.lock().pop_front();
            let Some(entry) = next else { break };

            match (entry.task)().await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(task = entry.label, error = %e, "queued task failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
