//! Fixed-size worker pool that runs tasks by priority, gated on the
//! completion of other tasks.

pub mod config;
pub mod error;
pub mod handle;
pub mod metrics;
mod queue;
pub mod scheduler;
pub mod task;
#[cfg(test)]
mod test_support;
mod worker;

pub use config::{load_dotenv, SchedulerConfig, ShutdownPolicy};
pub use error::{ConfigError, ProtocolError, SchedulerError, TaskError};
pub use handle::{CompletionHandle, TaskOutcome};
pub use metrics::SchedulerMetrics;
pub use scheduler::Scheduler;
pub use task::{Priority, Task, TaskId};
