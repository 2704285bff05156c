use super::task::{CountDownOnDrop, Latch, Task, TaskHandle};
use super::worker::{Worker, WorkerId, WorkerState};
use crate::config::ContextOptions;
use crate::error::{Error, Result};
use crossbeam_deque::Injector;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id % libc::CPU_SETSIZE as usize, &mut cpuset);
        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        );
        if result != 0 {
            tracing::warn!(
                thread = std::thread::current().name().unwrap_or("unknown"),
                core_id,
                "failed to pin worker thread"
            );
        }
    }
}

/// Work-stealing thread pool used for CPU kernel dispatch and CPU buffer
/// operations.
///
/// Must not be waited on from one of its own workers.
pub struct ThreadManager {
    workers: Vec<WorkerHandle>,
    injector: Arc<Injector<Task>>,
    shutdown: Arc<AtomicBool>,
    num_threads: usize,
    pending: Arc<Latch>,
    next_wake: AtomicUsize,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
    unparker: thread::Thread,
    state: Arc<WorkerState>,
}

impl ThreadManager {
    pub fn new(options: &ContextOptions) -> Result<Self> {
        let num_threads = options.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(Latch::new(0));

        let workers: Vec<Worker> = (0..num_threads).map(Worker::new).collect();
        let stealers: Vec<_> = workers.iter().map(|w| w.local_queue.stealer()).collect();

        let mut manager = Self {
            workers: Vec::with_capacity(num_threads),
            injector,
            shutdown,
            num_threads,
            pending,
            next_wake: AtomicUsize::new(0),
        };

        for worker in workers {
            let id = worker.id;
            let state = Arc::clone(&worker.state);
            let stealers_clone = stealers.clone();
            let injector_clone = Arc::clone(&manager.injector);
            let shutdown_clone = Arc::clone(&manager.shutdown);
            let pending_clone = Arc::clone(&manager.pending);
            let name = format!("{}-{}", options.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);
            if let Some(stack_size) = options.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let pin_workers = options.pin_workers;
            // a failed spawn drops `manager`, which joins the threads already started
            let thread = builder
                .spawn(move || {
                    #[cfg(target_os = "linux")]
                    if pin_workers {
                        pin_thread_to_core(id);
                    }
                    #[cfg(not(target_os = "linux"))]
                    let _ = pin_workers;

                    worker.run(stealers_clone, injector_clone, shutdown_clone, pending_clone);
                })
                .map_err(|e| Error::initialization(format!("worker spawn failed: {}", e)))?;

            let unparker = thread.thread().clone();
            manager.workers.push(WorkerHandle {
                id,
                thread: Some(thread),
                unparker,
                state,
            });
        }

        tracing::debug!(num_threads, "thread manager started");
        Ok(manager)
    }

    pub fn num_of_threads(&self) -> usize {
        self.num_threads
    }

    /// Tasks enqueued and not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.pending.remaining()
    }

    /// Run `task` once on a worker.
    pub fn enqueue<F>(&self, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let latch = Arc::new(Latch::new(1));
        let guard = CountDownOnDrop(Arc::clone(&latch));
        self.push(Task::new(move || {
            let _guard = guard;
            task();
        }));
        self.wake(1);
        TaskHandle::new(latch)
    }

    /// Run `task(i)` for every `i` in `begin..end`, spread over the workers.
    pub fn enqueue_loop<F>(&self, task: F, begin: usize, end: usize) -> TaskHandle
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        if begin >= end {
            return TaskHandle::completed();
        }

        let count = end - begin;
        let latch = Arc::new(Latch::new(count));
        let task = Arc::new(task);
        for i in begin..end {
            let task = Arc::clone(&task);
            let guard = CountDownOnDrop(Arc::clone(&latch));
            self.push(Task::new(move || {
                let _guard = guard;
                task(i);
            }));
        }
        self.wake(count);
        TaskHandle::new(latch)
    }

    /// Block until every enqueued task finished.
    pub fn wait_for_completion(&self) {
        self.pending.wait();
    }

    pub fn tasks_executed(&self) -> u64 {
        self.sum_state(|s| &s.tasks_executed)
    }

    pub fn tasks_stolen(&self) -> u64 {
        self.sum_state(|s| &s.tasks_stolen)
    }

    pub fn tasks_panicked(&self) -> u64 {
        self.sum_state(|s| &s.tasks_panicked)
    }

    fn sum_state(&self, field: impl Fn(&WorkerState) -> &AtomicU64) -> u64 {
        self.workers
            .iter()
            .map(|w| field(&w.state).load(Ordering::Relaxed))
            .sum()
    }

    fn push(&self, task: Task) {
        self.pending.increment(1);
        self.injector.push(task);
    }

    fn wake(&self, count: usize) {
        let n = count.min(self.workers.len());
        for _ in 0..n {
            let slot = self.next_wake.fetch_add(1, Ordering::Relaxed) % self.workers.len();
            self.workers[slot].unparker.unpark();
        }
    }

    fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        // wake everyone up to check shutdown flag
        for worker in &self.workers {
            worker.unparker.unpark();
        }

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::error!(worker = worker.id, "worker thread terminated abnormally");
                }
            }
        }
    }
}

impl std::fmt::Debug for ThreadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadManager")
            .field("num_threads", &self.num_threads)
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

impl Drop for ThreadManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn manager(threads: usize) -> ThreadManager {
        let options = ContextOptions::builder()
            .num_threads(threads)
            .build()
            .unwrap();
        ThreadManager::new(&options).unwrap()
    }

    #[test]
    fn test_enqueue_loop_covers_range() {
        let tm = manager(4);
        let seen = Arc::new(Mutex::new(vec![0u32; 100]));

        let handle = tm.enqueue_loop(
            {
                let seen = seen.clone();
                move |i| seen.lock()[i] += 1
            },
            0,
            100,
        );
        handle.wait().unwrap();

        assert!(handle.is_done());
        assert!(seen.lock().iter().all(|&n| n == 1));
    }

    #[test]
    fn test_empty_loop_is_complete() {
        let tm = manager(2);
        let handle = tm.enqueue_loop(|_| {}, 5, 5);
        assert!(handle.is_done());
    }

    #[test]
    fn test_wait_for_completion() {
        let tm = manager(3);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = counter.clone();
            tm.enqueue(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        tm.wait_for_completion();

        assert_eq!(counter.load(Ordering::Relaxed), 50);
        assert_eq!(tm.pending_tasks(), 0);
    }

    #[test]
    fn test_panicking_task_still_completes() {
        let tm = manager(2);
        let handle = tm.enqueue(|| panic!("boom"));
        assert!(matches!(handle.wait(), Err(Error::WorkerPanic(_))));
        tm.wait_for_completion();
        assert_eq!(tm.tasks_panicked(), 1);
    }

    #[test]
    fn test_drop_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let tm = manager(2);
            for _ in 0..20 {
                let counter = counter.clone();
                tm.enqueue(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        }
        assert_eq!(counter.load(Ordering::Relaxed), 20);
    }
}
