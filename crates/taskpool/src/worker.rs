//! Worker threads and the acquire / await / run / resolve loop.
//!
//! Each worker repeats:
//! 1. **Idle**: park on the ready queue until a task arrives or stop is set.
//! 2. **Acquire**: pop the highest-priority task.
//! 3. **Await dependencies**: wait on each dependency handle in list order.
//!    The first failure aborts the task with [`TaskError::DependencyFailed`].
//! 4. **Run**: call the work item. Errors and panics are captured.
//! 5. **Resolve**: resolve the task's own handle exactly once.
//!
//! A worker exits when the queue reports stopped and empty.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::error::TaskError;
use crate::handle::{CompletionHandle, TaskOutcome};
use crate::metrics::SchedulerMetrics;
use crate::queue::ReadyQueue;
use crate::task::{Task, TaskId, WorkFn};

/// State shared between the scheduler and its workers.
pub(crate) struct PoolShared {
    pub(crate) queue: ReadyQueue,
    pub(crate) metrics: RwLock<SchedulerMetrics>,
    /// Workers currently holding a dequeued task.
    pub(crate) busy: AtomicUsize,
}

impl PoolShared {
    pub(crate) fn new() -> Self {
        Self {
            queue: ReadyQueue::new(),
            metrics: RwLock::new(SchedulerMetrics::default()),
            busy: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_metrics(&self, f: impl FnOnce(&mut SchedulerMetrics)) {
        // Counters stay usable after a panic elsewhere held the lock.
        let mut m = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        f(&mut m);
    }

    pub(crate) fn metrics_snapshot(&self) -> SchedulerMetrics {
        self.metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

pub(crate) struct Worker {
    index: usize,
    shared: Arc<PoolShared>,
}

impl Worker {
    /// Start a named worker thread.
    pub(crate) fn spawn(
        index: usize,
        name_prefix: &str,
        shared: Arc<PoolShared>,
    ) -> io::Result<JoinHandle<()>> {
        let worker = Worker { index, shared };
        thread::Builder::new()
            .name(format!("{name_prefix}-{index}"))
            .spawn(move || worker.run())
    }

    fn run(self) {
        debug!(worker = self.index, "worker started");
        while let Some(task) = self.shared.queue.pop() {
            self.shared.busy.fetch_add(1, Ordering::Relaxed);
            self.execute(task);
            self.shared.busy.fetch_sub(1, Ordering::Relaxed);
        }
        debug!(worker = self.index, "worker stopping");
    }

    fn execute(&self, mut task: Task) {
        let label = task.label();
        debug!(
            worker = self.index,
            task = %task.id(),
            name = %label,
            priority = task.priority(),
            dependencies = task.dependencies().len(),
            "task acquired"
        );

        let outcome = match await_dependencies(task.dependencies()) {
            Err(e) => {
                warn!(worker = self.index, task = %task.id(), name = %label, error = %e, "dependency failed, task skipped");
                self.shared.with_metrics(|m| m.record_chain_failure());
                Err(e)
            }
            Ok(()) => match task.take_work() {
                Some(work) => self.run_work(&label, task.id(), work),
                None => {
                    error!(task = %task.id(), "task reached a worker without a work item");
                    Err(TaskError::Abandoned { task: task.id() })
                }
            },
        };

        // A rejected second resolution is already logged by the handle.
        let _ = task.completion().resolve(outcome);
    }

    fn run_work(&self, label: &str, task: TaskId, work: WorkFn) -> TaskOutcome {
        let started = Instant::now();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
        };
        let elapsed = started.elapsed();

        match &outcome {
            Ok(()) => debug!(worker = self.index, task = %task, name = %label, ?elapsed, "task succeeded"),
            Err(e) => warn!(worker = self.index, task = %task, name = %label, error = %e, "task failed"),
        }
        self.shared
            .with_metrics(|m| m.record_execution(label, elapsed, outcome.is_ok()));
        outcome
    }
}

/// Wait on each dependency in list order. The first failure wins.
pub(crate) fn await_dependencies(dependencies: &[CompletionHandle]) -> TaskOutcome {
    for dep in dependencies {
        dep.wait().map_err(|source| TaskError::DependencyFailed {
            dependency: dep.task_id(),
            source: Box::new(source),
        })?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn no_dependencies_is_ok() {
        assert_eq!(await_dependencies(&[]), Ok(()));
    }

    #[test]
    fn first_failed_dependency_in_list_order_is_reported() {
        let ok = CompletionHandle::detached();
        let first_bad = CompletionHandle::detached();
        let second_bad = CompletionHandle::detached();
        ok.resolve_success().unwrap();
        first_bad.resolve_failure(TaskError::Work("first".into())).unwrap();
        second_bad.resolve_failure(TaskError::Work("second".into())).unwrap();

        let err = await_dependencies(&[ok, first_bad.clone(), second_bad]).unwrap_err();
        assert_eq!(
            err,
            TaskError::DependencyFailed {
                dependency: first_bad.task_id(),
                source: Box::new(TaskError::Work("first".into())),
            }
        );
    }

    #[test]
    fn waits_for_pending_dependency() {
        let dep = CompletionHandle::detached();
        let d = dep.clone();
        let resolver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            d.resolve_success().unwrap();
        });
        assert_eq!(await_dependencies(&[dep]), Ok(()));
        resolver.join().unwrap();
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(17u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn worker_runs_queued_task_and_exits_on_stop() {
        let shared = Arc::new(PoolShared::new());
        let task = Task::infallible(1, || {}).named("unit");
        let handle = task.handle();
        shared.queue.push(task).unwrap();

        let join = Worker::spawn(0, "test-worker", Arc::clone(&shared)).unwrap();
        assert_eq!(handle.wait(), Ok(()));

        shared.queue.stop(crate::config::ShutdownPolicy::Drain);
        join.join().unwrap();

        let m = shared.metrics.read().unwrap();
        assert_eq!(m.tasks_executed["unit"], 1);
        assert_eq!(shared.busy.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn panicking_work_is_captured() {
        let shared = Arc::new(PoolShared::new());
        let task = Task::infallible(1, || panic!("kaboom"));
        let handle = task.handle();
        shared.queue.push(task).unwrap();

        let join = Worker::spawn(0, "test-worker", Arc::clone(&shared)).unwrap();
        assert_eq!(handle.wait(), Err(TaskError::Panicked("kaboom".into())));

        // The same worker keeps serving tasks after the panic.
        let next = Task::infallible(1, || {});
        let next_handle = next.handle();
        shared.queue.push(next).unwrap();
        assert_eq!(next_handle.wait(), Ok(()));

        shared.queue.stop(crate::config::ShutdownPolicy::Drain);
        join.join().unwrap();
    }

    #[test]
    fn metrics_survive_poisoned_lock() {
        let shared = Arc::new(PoolShared::new());
        let s = Arc::clone(&shared);
        let _ = thread::spawn(move || {
            let _guard = s.metrics.write().unwrap();
            panic!("poison metrics lock");
        })
        .join();
        assert!(shared.metrics.is_poisoned());

        shared.with_metrics(|m| m.record_execution("after", Duration::from_millis(1), true));
        shared.with_metrics(|m| m.tasks_submitted += 1);

        let snapshot = shared.metrics_snapshot();
        assert_eq!(snapshot.tasks_submitted, 1);
        assert_eq!(snapshot.tasks_executed["after"], 1);
    }
}
