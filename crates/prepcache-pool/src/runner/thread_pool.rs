//! Fixed-size thread pool runner

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use prepcache_core::{CacheError, Result, Task, TaskRunner};

use super::config::RunnerConfig;

struct Queue {
    tasks: VecDeque<Task>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    /// Signalled when a task is queued or the runner closes
    available: Condvar,
    active: AtomicUsize,
}

/// Runs posted tasks on a fixed set of worker threads
///
/// Tasks are executed in submission order by whichever worker is free. A
/// panicking task is logged and does not take its worker down. Tasks that
/// run longer than the configured maximum task time are reported; they are
/// not interrupted.
pub struct ThreadPoolRunner {
    config: RunnerConfig,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPoolRunner {
    /// Start a runner with the given configuration
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            active: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(config.num_threads());
        for index in 0..config.num_threads() {
            let worker_shared = Arc::clone(&shared);
            let max_task_time = config.max_task_time();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name(), index))
                .spawn(move || worker_loop(&worker_shared, max_task_time));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // let the threads already started exit
                    shared.queue.lock().closed = true;
                    shared.available.notify_all();
                    return Err(CacheError::Runner(format!(
                        "Failed to spawn worker thread: {}",
                        e
                    )));
                }
            }
        }
        tracing::debug!(threads = config.num_threads(), "task runner started");

        Ok(Self {
            config,
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Get the runner configuration
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Number of tasks waiting for a worker
    pub fn pending_tasks(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }

    /// Number of tasks currently executing
    pub fn active_tasks(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }

    /// Stop accepting tasks, run the ones already queued and join the workers
    pub fn close(&self) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.closed && self.workers.lock().is_empty() {
                return;
            }
            queue.closed = true;
        }
        self.shared.available.notify_all();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::warn!("task runner worker exited abnormally");
            }
        }
        tracing::debug!("task runner closed");
    }
}

impl TaskRunner for ThreadPoolRunner {
    fn post(&self, task: Task) -> Result<()> {
        let mut queue = self.shared.queue.lock();
        if queue.closed {
            return Err(CacheError::Runner("Task runner is closed".into()));
        }
        queue.tasks.push_back(task);
        drop(queue);
        self.shared.available.notify_one();
        Ok(())
    }
}

impl Drop for ThreadPoolRunner {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(shared: &Shared, max_task_time: Option<Duration>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                if queue.closed {
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };

        shared.active.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!("task panicked in runner worker");
        }
        let elapsed = started.elapsed();
        shared.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(max) = max_task_time
            && elapsed > max
        {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                max_ms = max.as_millis() as u64,
                "task exceeded the maximum task time"
            );
        }
    }
}
