use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler counters, exposed as a cloneable snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Tasks accepted into the ready queue.
    pub tasks_submitted: u64,
    /// Tasks whose work ran and returned success.
    pub tasks_succeeded: u64,
    /// Tasks whose work returned an error or panicked.
    pub tasks_failed: u64,
    /// Tasks resolved as failed because a dependency failed.
    pub chain_failures: u64,
    /// Tasks resolved as abandoned without running.
    pub tasks_abandoned: u64,
    /// Work executions by task label, successful or not.
    pub tasks_executed: HashMap<String, u64>,
    /// Average work duration by task label.
    pub avg_task_duration: HashMap<String, Duration>,
    /// When the most recent task resolved.
    pub last_completed: Option<DateTime<Utc>>,
    /// Workers currently holding a task.
    pub busy_workers: usize,
    /// Tasks waiting in the ready queue.
    pub queued: usize,
}

impl SchedulerMetrics {
    /// Record one execution of a work item.
    pub fn record_execution(&mut self, task_name: &str, duration: Duration, succeeded: bool) {
        if succeeded {
            self.tasks_succeeded += 1;
        } else {
            self.tasks_failed += 1;
        }
        *self.tasks_executed.entry(task_name.to_string()).or_default() += 1;
        self.last_completed = Some(Utc::now());

        // Update rolling average duration
        let count = self.tasks_executed[task_name];
        let prev_avg = self
            .avg_task_duration
            .get(task_name)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_task_duration
            .insert(task_name.to_string(), new_avg);
    }

    /// Record a task that failed without running because of a dependency.
    pub fn record_chain_failure(&mut self) {
        self.chain_failures += 1;
        self.last_completed = Some(Utc::now());
    }

    pub fn record_abandoned(&mut self, count: usize) {
        self.tasks_abandoned += count as u64;
    }

    /// Tasks that reached a terminal outcome through a worker or shutdown.
    pub fn tasks_resolved(&self) -> u64 {
        self.tasks_succeeded + self.tasks_failed + self.chain_failures + self.tasks_abandoned
    }
}
