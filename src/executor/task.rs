//! Task representation and completion tracking.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) func: Box<dyn FnOnce() + Send + 'static>,
    pub(crate) spawn_time: Instant,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            id: TaskId::next(),
            func: Box::new(f),
            spawn_time: Instant::now(),
        }
    }

    pub fn execute(self) {
        (self.func)();
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("spawn_time", &self.spawn_time)
            .finish()
    }
}

/// Counter that blocks waiters until it drops to zero.
#[derive(Debug, Default)]
pub(crate) struct Latch {
    remaining: AtomicUsize,
    panicked: AtomicUsize,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl Latch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            panicked: AtomicUsize::new(0),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        }
    }

    pub fn increment(&self, n: usize) {
        self.remaining.fetch_add(n, Ordering::AcqRel);
    }

    pub fn count_down(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.lock.lock();
            self.cvar.notify_all();
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    pub fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::AcqRel);
    }

    /// Tasks counted down by a panic rather than by finishing.
    pub fn panicked(&self) -> usize {
        self.panicked.load(Ordering::Acquire)
    }

    pub fn wait(&self) {
        if self.is_done() {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.is_done() {
            self.cvar.wait(&mut guard);
        }
    }
}

/// Counts a latch down when dropped, so a panicking task still completes.
/// A drop during unwinding is recorded as a panic on the latch.
pub(crate) struct CountDownOnDrop(pub(crate) Arc<Latch>);

impl Drop for CountDownOnDrop {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.record_panic();
        }
        self.0.count_down();
    }
}

/// Completion handle of one `enqueue` / `enqueue_loop` call.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    latch: Arc<Latch>,
}

impl TaskHandle {
    pub(crate) fn new(latch: Arc<Latch>) -> Self {
        Self { latch }
    }

    /// A handle that is already complete.
    pub fn completed() -> Self {
        Self {
            latch: Arc::new(Latch::new(0)),
        }
    }

    /// Block until every task of the call finished.
    ///
    /// Fails with [`Error::WorkerPanic`] if any of them panicked.
    pub fn wait(&self) -> Result<()> {
        self.latch.wait();
        match self.latch.panicked() {
            0 => Ok(()),
            n => Err(Error::WorkerPanic(format!("{} task(s) panicked", n))),
        }
    }

    pub fn is_done(&self) -> bool {
        self.latch.is_done()
    }

    pub fn has_panicked(&self) -> bool {
        self.latch.panicked() > 0
    }

    /// Tasks of the call that have not finished yet.
    pub fn remaining(&self) -> usize {
        self.latch.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_task_ids_increase() {
        let a = Task::new(|| {});
        let b = Task::new(|| {});
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_latch_releases_waiter() {
        let latch = Arc::new(Latch::new(3));
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let latch = latch.clone();
                thread::spawn(move || latch.count_down())
            })
            .collect();

        latch.wait();
        assert!(latch.is_done());
        for w in workers {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_count_down_on_drop() {
        let latch = Arc::new(Latch::new(1));
        let guard_latch = latch.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = CountDownOnDrop(guard_latch);
            panic!("task failed");
        }));
        assert!(result.is_err());
        assert!(latch.is_done());
        assert_eq!(latch.panicked(), 1);
    }

    #[test]
    fn test_handle_reports_panicked_tasks() {
        let latch = Arc::new(Latch::new(2));
        let handle = TaskHandle::new(Arc::clone(&latch));

        drop(CountDownOnDrop(Arc::clone(&latch)));
        let guard_latch = Arc::clone(&latch);
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = CountDownOnDrop(guard_latch);
            panic!("kernel failed");
        }));

        assert!(handle.is_done());
        assert!(handle.has_panicked());
        assert!(matches!(handle.wait(), Err(Error::WorkerPanic(_))));
    }

    #[test]
    fn test_completed_handle() {
        let handle = TaskHandle::completed();
        assert!(handle.is_done());
        assert!(handle.wait().is_ok());
    }
}
