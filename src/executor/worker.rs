// worker thread loop
use super::task::{Latch, Task};
use crate::util::Backoff;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub type WorkerId = usize;

// stats for each worker
#[derive(Debug, Default)]
pub struct WorkerState {
    pub tasks_executed: AtomicU64,
    pub tasks_stolen: AtomicU64,
    pub tasks_panicked: AtomicU64,
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Task>,
    pub state: Arc<WorkerState>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
            state: Arc::new(WorkerState::default()),
        }
    }

    // main loop, drains remaining work before honouring shutdown
    pub fn run(
        &self,
        stealers: Vec<Stealer<Task>>,
        injector: Arc<Injector<Task>>,
        shutdown: Arc<AtomicBool>,
        pending: Arc<Latch>,
    ) {
        let mut backoff = Backoff::new();

        loop {
            if let Some(task) = self.find_task(&stealers, &injector) {
                backoff.reset();
                self.execute_task(task);
                pending.count_down();
            } else if shutdown.load(Ordering::Acquire) {
                break;
            } else {
                backoff.snooze();
            }
        }
    }

    fn find_task(&self, stealers: &[Stealer<Task>], injector: &Injector<Task>) -> Option<Task> {
        // local -> global -> steal
        if let Some(task) = self.local_queue.pop() {
            return Some(task);
        }

        loop {
            match injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        self.try_steal_from_workers(stealers)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Task>]) -> Option<Task> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() <= 1 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(task) => {
                        self.state.tasks_stolen.fetch_add(1, Ordering::Relaxed);
                        return Some(task);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn execute_task(&self, task: Task) {
        let tid = task.id;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            task.execute();
        }));

        if let Err(payload) = result {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(worker = self.id, task = ?tid, %message, "task panicked");
            self.state.tasks_panicked.fetch_add(1, Ordering::Relaxed);
        }

        self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }
}
