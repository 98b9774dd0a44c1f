//! Ready queue: a mutex/condvar pair guarding a max-priority binary heap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::config::ShutdownPolicy;
use crate::task::{Priority, Task};

/// Heap entry. Highest priority first; among equals, earliest submission first.
struct Entry {
    priority: Priority,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    stopped: bool,
}

/// Unbounded, concurrency-safe priority buffer of submitted tasks.
pub(crate) struct ReadyQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue and wake one idle worker. Hands the task back once stopped.
    pub(crate) fn push(&self, task: Task) -> Result<(), Task> {
        let mut state = self.lock();
        if state.stopped {
            return Err(task);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry {
            priority: task.priority(),
            seq,
            task,
        });
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until a task is available or the queue is stopped and empty.
    ///
    /// `None` tells the worker to exit.
    pub(crate) fn pop(&self) -> Option<Task> {
        let mut state = self.lock();
        loop {
            if let Some(entry) = state.heap.pop() {
                return Some(entry.task);
            }
            if state.stopped {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Set the stop flag and wake every parked worker.
    ///
    /// Under [`ShutdownPolicy::Abandon`] the backlog is removed and returned in
    /// priority order; the caller decides how to resolve it. Under
    /// [`ShutdownPolicy::Drain`] the backlog stays for workers to finish.
    pub(crate) fn stop(&self, policy: ShutdownPolicy) -> Vec<Task> {
        let mut state = self.lock();
        state.stopped = true;
        let backlog = match policy {
            ShutdownPolicy::Drain => Vec::new(),
            ShutdownPolicy::Abandon => {
                let mut entries = std::mem::take(&mut state.heap).into_sorted_vec();
                entries.reverse();
                entries.into_iter().map(|e| e.task).collect()
            }
        };
        drop(state);
        self.available.notify_all();
        backlog
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.lock().stopped
    }
}
