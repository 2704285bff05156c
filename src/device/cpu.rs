//! CPU device: submissions run on the context's thread manager.

use crate::config::MAX_TASK_BATCH_SIZE;
use crate::error::{Error, Result};
use crate::executor::{Latch, TaskHandle, ThreadManager};
use std::sync::{Arc, Weak};

pub(crate) struct CpuDevice {
    thread_manager: Weak<ThreadManager>,
    in_flight: Arc<Latch>,
    task_batch_size: usize,
}

/// Counts a device's in-flight latch down once the last clone drops.
struct InFlightGuard(Arc<Latch>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

impl CpuDevice {
    pub(crate) fn new(
        thread_manager: &Arc<ThreadManager>,
        batch_size_hint: usize,
        min_work_group_size: usize,
    ) -> Self {
        Self {
            thread_manager: Arc::downgrade(thread_manager),
            in_flight: Arc::new(Latch::new(0)),
            task_batch_size: task_batch_size(batch_size_hint, min_work_group_size),
        }
    }

    /// Work groups claimed per atomic fetch by a worker.
    pub(crate) fn task_batch_size(&self) -> usize {
        self.task_batch_size
    }

    pub(crate) fn thread_manager(&self) -> Result<Arc<ThreadManager>> {
        self.thread_manager
            .upgrade()
            .ok_or_else(|| Error::expired("device", "thread manager"))
    }

    pub(crate) fn num_of_threads(&self) -> Result<usize> {
        Ok(self.thread_manager()?.num_of_threads())
    }

    pub(crate) fn submit<F>(&self, task: F) -> Result<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_manager = self.thread_manager()?;
        let guard = self.track();
        Ok(thread_manager.enqueue(move || {
            let _guard = guard;
            task();
        }))
    }

    /// Run `task(i)` for `i` in `begin..end`. The submission stays in flight
    /// until every iteration finished.
    pub(crate) fn submit_loop<F>(&self, task: F, begin: usize, end: usize) -> Result<TaskHandle>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let thread_manager = self.thread_manager()?;
        let guard = self.track();
        Ok(thread_manager.enqueue_loop(
            move |i| {
                let _ = &guard;
                task(i);
            },
            begin,
            end,
        ))
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.remaining()
    }

    pub(crate) fn wait_for_completion(&self) {
        self.in_flight.wait();
    }

    fn track(&self) -> InFlightGuard {
        self.in_flight.increment(1);
        InFlightGuard(Arc::clone(&self.in_flight))
    }
}

/// Round `hint` to a power of two and clamp it to
/// `[min_work_group_size, MAX_TASK_BATCH_SIZE]`.
pub(crate) fn task_batch_size(hint: usize, min_work_group_size: usize) -> usize {
    let min = min_work_group_size.max(1).next_power_of_two();
    hint.max(1).next_power_of_two().clamp(min, MAX_TASK_BATCH_SIZE)
}
