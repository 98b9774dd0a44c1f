//! Error types for task execution, handle protocol misuse, and configuration.

use thiserror::Error;

use crate::task::TaskId;

/// Failure outcome carried by a [`CompletionHandle`](crate::CompletionHandle).
///
/// Cloned out to every waiter, so all observers of a handle see the same value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The work item returned an error.
    #[error("Task failed: {0}")]
    Work(String),

    /// The work item panicked. The worker caught the unwind and kept running.
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// A declared dependency failed, so the work item never ran.
    #[error("Dependency {dependency} failed: {source}")]
    DependencyFailed {
        dependency: TaskId,
        source: Box<TaskError>,
    },

    /// The task was dropped before it could run.
    #[error("Task {task} abandoned before execution")]
    Abandoned { task: TaskId },
}

impl TaskError {
    /// Follow a chain of dependency failures down to the error that started it.
    pub fn root_cause(&self) -> &TaskError {
        let mut current = self;
        while let TaskError::DependencyFailed { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether this failure was inherited from a dependency.
    pub fn is_chain_failure(&self) -> bool {
        matches!(self, TaskError::DependencyFailed { .. })
    }
}

/// Misuse of the completion handle protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("completion handle for task {0} already resolved")]
    AlreadyResolved(TaskId),
}

/// Errors raised while constructing a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        index: usize,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while loading [`SchedulerConfig`](crate::SchedulerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_nested_chain() {
        let root = TaskError::Work("boom".into());
        let chained = TaskError::DependencyFailed {
            dependency: TaskId::from_raw(2),
            source: Box::new(TaskError::DependencyFailed {
                dependency: TaskId::from_raw(1),
                source: Box::new(root.clone()),
            }),
        };

        assert!(chained.is_chain_failure());
        assert_eq!(chained.root_cause(), &root);
        assert!(!root.is_chain_failure());
    }

    #[test]
    fn dependency_failure_message_keeps_original_text() {
        let err = TaskError::DependencyFailed {
            dependency: TaskId::from_raw(7),
            source: Box::new(TaskError::Work("boom".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("task-7"), "got: {msg}");
        assert!(msg.contains("boom"), "got: {msg}");
    }

    #[test]
    fn dependency_failure_exposes_source() {
        use std::error::Error as _;

        let err = TaskError::DependencyFailed {
            dependency: TaskId::from_raw(1),
            source: Box::new(TaskError::Work("boom".into())),
        };
        let source = err.source().expect("source present");
        assert_eq!(source.to_string(), "Task failed: boom");
    }
}
