use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{JoinHandle, ThreadId};

use tracing::{debug, info, warn};

use crate::config::{SchedulerConfig, ShutdownPolicy};
use crate::error::{SchedulerError, TaskError};
use crate::handle::CompletionHandle;
use crate::metrics::SchedulerMetrics;
use crate::task::{Priority, Task};
use crate::worker::{PoolShared, Worker};

/// Fixed-size worker pool executing [`Task`]s by priority.
///
/// Workers start at construction and run until [`shutdown`](Self::shutdown)
/// or drop. Submission never blocks and returns the task's
/// [`CompletionHandle`].
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    /// Ready queue, metrics, and busy-worker count shared with workers.
    pub(super) shared: Arc<PoolShared>,
    /// Join handles, taken by the first shutdown caller.
    pub(super) workers: Mutex<Vec<JoinHandle<()>>>,
    /// Worker thread ids, so a shutdown issued from a task can tell.
    pub(super) worker_ids: Vec<ThreadId>,
    /// Set once the caller holding the join handles has joined them.
    pub(super) joined: Mutex<bool>,
    pub(super) joined_cv: Condvar,
    pub(super) worker_count: usize,
}

impl Scheduler {
    /// Create a scheduler with `worker_threads` workers (0 = available
    /// parallelism) and defaults elsewhere.
    pub fn new(worker_threads: usize) -> Result<Self, SchedulerError> {
        Self::with_config(SchedulerConfig::with_workers(worker_threads))
    }

    /// Create a scheduler from `TASKPOOL_*` environment variables.
    pub fn from_env() -> Result<Self, SchedulerError> {
        Self::with_config(SchedulerConfig::from_env()?)
    }

    /// Create a scheduler and start its workers.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let worker_count = config.resolved_worker_threads();
        let shared = Arc::new(PoolShared::new());

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            match Worker::spawn(index, &config.thread_name_prefix, Arc::clone(&shared)) {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    // Nothing can have been submitted yet; release the workers already running.
                    shared.queue.stop(ShutdownPolicy::Drain);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::Spawn { index, source });
                }
            }
        }

        info!(
            workers = worker_count,
            shutdown_policy = %config.shutdown_policy,
            "Scheduler started"
        );

        let worker_ids = workers.iter().map(|h| h.thread().id()).collect();
        Ok(Self {
            config,
            shared,
            workers: Mutex::new(workers),
            worker_ids,
            joined: Mutex::new(false),
            joined_cv: Condvar::new(),
            worker_count,
        })
    }

    /// Enqueue `task` and return its completion handle immediately.
    ///
    /// After shutdown the task is not queued; the returned handle is already
    /// resolved as [`TaskError::Abandoned`].
    pub fn submit(&self, task: Task) -> CompletionHandle {
        let handle = task.handle();
        handle.set_unobserved_logging(self.config.log_unobserved_failures);

        let id = task.id();
        let priority = task.priority();
        let dependencies = task.dependencies().len();

        // Counted before the push so no worker can report the task first.
        self.shared.with_metrics(|m| m.tasks_submitted += 1);
        match self.shared.queue.push(task) {
            Ok(()) => debug!(task = %id, priority, dependencies, "task submitted"),
            Err(rejected) => {
                warn!(task = %id, "task submitted after shutdown, abandoned");
                self.shared.with_metrics(|m| {
                    m.tasks_submitted -= 1;
                    m.record_abandoned(1);
                });
                rejected
                    .completion()
                    .resolve_if_pending(Err(TaskError::Abandoned { task: id }));
            }
        }
        handle
    }

    /// Build and submit a task in one call.
    pub fn submit_fn<F, E, I>(&self, priority: Priority, dependencies: I, work: F) -> CompletionHandle
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: std::fmt::Display,
        I: IntoIterator<Item = CompletionHandle>,
    {
        self.submit(Task::new(priority, work).with_dependencies(dependencies))
    }

    /// Number of worker threads started at construction.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Tasks waiting in the ready queue.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Whether shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.shared.queue.is_stopped()
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        let mut snapshot = self.shared.metrics_snapshot();
        snapshot.busy_workers = self.shared.busy.load(Ordering::Relaxed);
        snapshot.queued = self.shared.queue.len();
        snapshot
    }
}
