//! Priority task scheduler -- owns the ready queue and the worker set.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, construction, submission, and accessors
//! - `lifecycle`: shutdown protocol and drop behavior
//!
//! Tasks are served highest priority first. A task's dependencies are awaited
//! by the worker that dequeued it, so a worker parked on a dependency keeps
//! its slot while the other workers keep draining the queue. With a single
//! worker, a task must not depend on a task queued behind it.

mod core;
mod lifecycle;

pub use self::core::Scheduler;
