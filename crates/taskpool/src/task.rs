use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::error::TaskError;
use crate::handle::CompletionHandle;

/// Task priority. Higher value = served earlier.
pub type Priority = i32;

/// Boxed work item. Errors are already normalized to [`TaskError`].
pub(crate) type WorkFn = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A unit of work for the [`Scheduler`](crate::Scheduler).
///
/// Owns its work item and its own [`CompletionHandle`]; dependencies are
/// handles of other tasks, shared rather than owned. A task that is dropped
/// without running resolves its handle as [`TaskError::Abandoned`], so no
/// waiter is left blocked on it.
pub struct Task {
    id: TaskId,
    name: Option<String>,
    priority: Priority,
    work: Option<WorkFn>,
    dependencies: Vec<CompletionHandle>,
    handle: CompletionHandle,
}

impl Task {
    /// Build a task from a fallible work item.
    pub fn new<F, E>(priority: Priority, work: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let id = TaskId::next();
        Self {
            id,
            name: None,
            priority,
            work: Some(Box::new(move || work().map_err(|e| TaskError::Work(e.to_string())))),
            dependencies: Vec::new(),
            handle: CompletionHandle::new(id),
        }
    }

    /// Build a task from a work item that cannot fail (it may still panic).
    pub fn infallible<F>(priority: Priority, work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(priority, move || {
            work();
            Ok::<(), std::convert::Infallible>(())
        })
    }

    /// Attach a human-readable name used in logs and metrics.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a dependency. Dependencies are awaited in the order they are added.
    pub fn depends_on(mut self, dependency: &CompletionHandle) -> Self {
        self.dependencies.push(dependency.clone());
        self
    }

    pub fn with_dependencies<I>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = CompletionHandle>,
    {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if set, otherwise the id. Used as the metrics key.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn dependencies(&self) -> &[CompletionHandle] {
        &self.dependencies
    }

    /// A shared reference to this task's completion handle.
    pub fn handle(&self) -> CompletionHandle {
        self.handle.clone()
    }

    pub(crate) fn completion(&self) -> &CompletionHandle {
        &self.handle
    }

    /// Take the work item out. Yields `Some` at most once.
    pub(crate) fn take_work(&mut self) -> Option<WorkFn> {
        self.work.take()
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        let abandoned = TaskError::Abandoned { task: self.id };
        if self.handle.resolve_if_pending(Err(abandoned)) {
            warn!(task = %self.id, name = ?self.name, "task dropped before execution, resolved as abandoned");
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies.len())
            .field("handle", &self.handle)
            .finish()
    }
}
