//! One-shot, multi-reader completion signal shared between a task, its
//! submitter, and any task that lists it as a dependency.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::{ProtocolError, TaskError};
use crate::task::TaskId;

/// Terminal value observed by every waiter of a handle.
pub type TaskOutcome = Result<(), TaskError>;

#[derive(Debug)]
enum HandleState {
    Pending,
    Resolved(TaskOutcome),
}

struct Inner {
    task: TaskId,
    state: Mutex<HandleState>,
    resolved: Condvar,
    /// Set once any holder has read the terminal outcome.
    observed: AtomicBool,
    log_unobserved: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        // No user code runs while this lock is held, so a poisoned lock
        // still guards a consistent state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.observed.load(Ordering::Acquire) || !self.log_unobserved.load(Ordering::Relaxed) {
            return;
        }
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let HandleState::Resolved(Err(e)) = state {
            warn!(task = %self.task, error = %e, "task failure was never observed");
        }
    }
}

/// Shared completion signal for a single task.
///
/// Cloning is cheap and every clone refers to the same state. The handle moves
/// from pending to exactly one terminal outcome; [`wait`](Self::wait) blocks
/// until that happens and returns the outcome to any number of callers.
#[derive(Clone)]
pub struct CompletionHandle {
    inner: Arc<Inner>,
}

impl CompletionHandle {
    pub(crate) fn new(task: TaskId) -> Self {
        Self {
            inner: Arc::new(Inner {
                task,
                state: Mutex::new(HandleState::Pending),
                resolved: Condvar::new(),
                observed: AtomicBool::new(false),
                log_unobserved: AtomicBool::new(true),
            }),
        }
    }

    /// Create a handle not tied to any scheduled task.
    ///
    /// Useful as an external gate: tasks may depend on it, and the caller
    /// resolves it when the outside condition is met.
    pub fn detached() -> Self {
        Self::new(TaskId::next())
    }

    /// Id of the task this handle reports on.
    pub fn task_id(&self) -> TaskId {
        self.inner.task
    }

    /// Mark the handle resolved successfully.
    pub fn resolve_success(&self) -> Result<(), ProtocolError> {
        self.resolve(Ok(()))
    }

    /// Mark the handle resolved with `error`.
    pub fn resolve_failure(&self, error: TaskError) -> Result<(), ProtocolError> {
        self.resolve(Err(error))
    }

    /// Transition from pending to `outcome` and wake every waiter.
    ///
    /// A second resolution is rejected and the first outcome is kept.
    pub fn resolve(&self, outcome: TaskOutcome) -> Result<(), ProtocolError> {
        let mut state = self.inner.lock();
        if let HandleState::Resolved(existing) = &*state {
            warn!(
                task = %self.inner.task,
                existing = ?existing,
                rejected = ?outcome,
                "completion handle resolved twice"
            );
            return Err(ProtocolError::AlreadyResolved(self.inner.task));
        }
        debug!(task = %self.inner.task, ok = outcome.is_ok(), "completion handle resolved");
        *state = HandleState::Resolved(outcome);
        drop(state);
        self.inner.resolved.notify_all();
        Ok(())
    }

    /// Resolve only if still pending. Returns whether this call resolved it.
    pub(crate) fn resolve_if_pending(&self, outcome: TaskOutcome) -> bool {
        let mut state = self.inner.lock();
        if matches!(&*state, HandleState::Resolved(_)) {
            return false;
        }
        *state = HandleState::Resolved(outcome);
        drop(state);
        self.inner.resolved.notify_all();
        true
    }

    /// Block until the handle resolves, then return its outcome.
    ///
    /// Returns immediately if already resolved. Safe to call concurrently and
    /// any number of times.
    pub fn wait(&self) -> TaskOutcome {
        let mut state = self.inner.lock();
        loop {
            if let HandleState::Resolved(outcome) = &*state {
                self.inner.observed.store(true, Ordering::Release);
                return outcome.clone();
            }
            state = self
                .inner
                .resolved
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Non-blocking peek at the outcome. `None` while pending.
    pub fn try_outcome(&self) -> Option<TaskOutcome> {
        match &*self.inner.lock() {
            HandleState::Pending => None,
            HandleState::Resolved(outcome) => {
                self.inner.observed.store(true, Ordering::Release);
                Some(outcome.clone())
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.inner.lock(), HandleState::Resolved(_))
    }

    pub(crate) fn set_unobserved_logging(&self, enabled: bool) {
        self.inner.log_unobserved.store(enabled, Ordering::Relaxed);
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.lock() {
            HandleState::Pending => "pending",
            HandleState::Resolved(Ok(())) => "succeeded",
            HandleState::Resolved(Err(_)) => "failed",
        };
        f.debug_struct("CompletionHandle")
            .field("task", &self.inner.task)
            .field("state", &state)
            .finish()
    }
}
