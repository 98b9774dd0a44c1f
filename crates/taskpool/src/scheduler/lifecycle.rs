use std::thread;

use tracing::{error, info, warn};

use crate::error::TaskError;

use super::Scheduler;

impl Scheduler {
    /// Stop accepting work, wake every worker, and join them.
    ///
    /// Queued tasks are drained or abandoned according to the configured
    /// [`ShutdownPolicy`](crate::ShutdownPolicy); a task already dequeued
    /// always finishes. Idempotent: a later or concurrent caller blocks until
    /// the first caller has joined the workers. Called from inside a task, it
    /// returns without joining that task's own worker. A worker blocked on a
    /// dependency that never resolves keeps this call blocked.
    pub fn shutdown(&self) {
        let first = !self.shared.queue.is_stopped();
        let backlog = self.shared.queue.stop(self.config.shutdown_policy);
        if first {
            info!(policy = %self.config.shutdown_policy, "Scheduler shutdown requested");
        }

        if !backlog.is_empty() {
            warn!(count = backlog.len(), "abandoning queued tasks at shutdown");
            self.shared.with_metrics(|m| m.record_abandoned(backlog.len()));
            for task in backlog {
                let id = task.id();
                task.completion()
                    .resolve_if_pending(Err(TaskError::Abandoned { task: id }));
            }
        }

        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let current = thread::current().id();
        if handles.is_empty() {
            // Another caller owns the joins. A worker waiting here would wait on itself.
            if !self.worker_ids.contains(&current) {
                self.wait_joined();
            }
            return;
        }

        for handle in handles {
            // Shutdown issued from inside a task cannot join its own worker.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        self.mark_joined();
        info!("Scheduler stopped");
    }

    fn mark_joined(&self) {
        let mut joined = self.joined.lock().unwrap_or_else(|e| e.into_inner());
        *joined = true;
        drop(joined);
        self.joined_cv.notify_all();
    }

    fn wait_joined(&self) {
        let mut joined = self.joined.lock().unwrap_or_else(|e| e.into_inner());
        while !*joined {
            joined = self
                .joined_cv
                .wait(joined)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
