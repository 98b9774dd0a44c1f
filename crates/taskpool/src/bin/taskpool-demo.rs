//! taskpool-demo — runs a small dependency graph through the scheduler.
//!
//! Four tasks on one pool:
//! - task 1 (priority 2) and task 2 (priority 3) run independently
//! - task 3 (priority 1) depends on tasks 1 and 2
//! - task 4 (priority 4) fails
//!
//! The failure of task 4 is caught and printed; the metrics snapshot is
//! printed as JSON after shutdown.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, TryFromFloatSecsError};

use clap::Parser;
use tracing::{info, warn};

use taskpool::{load_dotenv, Scheduler, SchedulerConfig, ShutdownPolicy, Task};

// ── CLI ─────────────────────────────────────────────────────────────

/// Priority task scheduler demo.
#[derive(Parser, Debug)]
#[command(name = "taskpool-demo", version, about)]
struct Cli {
    /// Path to a TOML scheduler config. Env vars override it.
    #[arg(long, env = "TASKPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Worker thread count (overrides config and env).
    #[arg(long)]
    workers: Option<usize>,

    /// Backlog handling at shutdown: "drain" or "abandon".
    #[arg(long)]
    shutdown_policy: Option<ShutdownPolicy>,

    /// Scale factor applied to every task's simulated work time.
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,
}

/// Simulated work time for `ms` milliseconds at `scale`. Rejects scales that
/// overflow a `Duration`, such as infinity.
fn simulated(ms: u64, scale: f64) -> Result<Duration, TryFromFloatSecsError> {
    Duration::try_from_secs_f64(ms as f64 / 1000.0 * scale.max(0.0))
}

fn load_config(cli: &Cli) -> anyhow::Result<SchedulerConfig> {
    let base = match &cli.config {
        Some(path) => {
            let cfg = SchedulerConfig::from_file(path)?;
            info!(path = %path.display(), "loaded scheduler config");
            cfg
        }
        None => SchedulerConfig::with_workers(4),
    };
    let mut config = base.with_env_overrides()?;
    if let Some(workers) = cli.workers {
        config.worker_threads = workers;
    }
    if let Some(policy) = cli.shutdown_policy {
        config.shutdown_policy = policy;
    }
    Ok(config)
}

// ── main ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.log_summary();

    let scale = cli.time_scale;
    let (t1, t2, t3) = (
        simulated(500, scale)?,
        simulated(300, scale)?,
        simulated(200, scale)?,
    );
    let scheduler = Scheduler::with_config(config)?;

    let task1 = Task::infallible(2, move || {
        println!("Task 1 started");
        thread::sleep(t1);
        println!("Task 1 completed");
    })
    .named("task-1");
    let task2 = Task::infallible(3, move || {
        println!("Task 2 started");
        thread::sleep(t2);
        println!("Task 2 completed");
    })
    .named("task-2");
    let task3 = Task::infallible(1, move || {
        println!("Task 3 (depends on 1 and 2) started");
        thread::sleep(t3);
        println!("Task 3 completed");
    })
    .named("task-3")
    .depends_on(&task1.handle())
    .depends_on(&task2.handle());
    let task4 = Task::new(4, || {
        println!("Task 4 (throws error)");
        Err::<(), _>("Error in Task 4")
    })
    .named("task-4");

    let fut1 = scheduler.submit(task1);
    let fut2 = scheduler.submit(task2);
    let fut3 = scheduler.submit(task3);
    let fut4 = scheduler.submit(task4);

    if let Err(e) = fut4.wait() {
        println!("Caught error: {e}");
    }

    match fut3.wait() {
        Ok(()) => info!("dependent task finished"),
        Err(e) => warn!(error = %e, "dependent task failed"),
    }
    for (name, handle) in [("task-1", &fut1), ("task-2", &fut2)] {
        if let Err(e) = handle.wait() {
            warn!(task = name, error = %e, "task failed");
        }
    }

    scheduler.shutdown();
    println!("{}", serde_json::to_string_pretty(&scheduler.metrics())?);

    info!("taskpool-demo exited cleanly");
    Ok(())
}
